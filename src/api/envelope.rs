// src/api/envelope.rs — JSON response envelope
//
// Non-streaming endpoints answer {code, message, msg?, error_msg?}.
// code 200 is success; anything else carries a localized error_msg, and
// the HTTP status mirrors the code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::infra::errors::SkiffError;
use crate::locale::LocaleStore;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub message: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl Envelope {
    pub fn ok(message: impl Serialize) -> Self {
        Self {
            code: 200,
            message: serde_json::to_value(message).unwrap_or(serde_json::Value::Null),
            msg: Some("success".into()),
            error_msg: None,
        }
    }

    pub fn failure(err: &SkiffError, locale: &LocaleStore) -> Self {
        if matches!(err, SkiffError::Internal(_) | SkiffError::Storage(_)) {
            tracing::error!("request failed: {err:?}");
        }
        Self {
            code: err.code(),
            message: serde_json::Value::Null,
            msg: None,
            error_msg: Some(format!("{}: {}", locale.text(err.locale_key()), err)),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Fold a handler result into the envelope shape.
pub fn respond<T: Serialize>(locale: &LocaleStore, result: Result<T, SkiffError>) -> Envelope {
    match result {
        Ok(v) => Envelope::ok(v),
        Err(e) => Envelope::failure(&e, locale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStore;
    use std::sync::Arc;

    fn locale() -> LocaleStore {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        // Leak the tempdir so the store outlives the test body.
        std::mem::forget(dir);
        LocaleStore::new(store)
    }

    #[test]
    fn test_ok_shape() {
        let e = Envelope::ok(serde_json::json!({"x": 1}));
        assert_eq!(e.code, 200);
        assert!(e.error_msg.is_none());
    }

    #[test]
    fn test_failure_carries_code_and_message() {
        let locale = locale();
        let e = Envelope::failure(&SkiffError::not_found("conversation 'x'"), &locale);
        assert_eq!(e.code, 404);
        let msg = e.error_msg.unwrap();
        assert!(msg.contains("not found"));
        assert!(msg.contains("conversation 'x'"));
    }
}
