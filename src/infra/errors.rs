// src/infra/errors.rs — Error types for Skiff

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream '{supplier}' failed: {message}")]
    Upstream { supplier: String, message: String },

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("request canceled")]
    Canceled,

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SkiffError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SkiffError::NotFound { what: what.into() }
    }

    pub fn upstream(supplier: impl Into<String>, message: impl Into<String>) -> Self {
        SkiffError::Upstream {
            supplier: supplier.into(),
            message: message.into(),
        }
    }

    /// Wire envelope code for this error. Mirrors the HTTP status.
    pub fn code(&self) -> u16 {
        match self {
            SkiffError::NotFound { .. } => 404,
            SkiffError::InvalidRequest(_) => 400,
            SkiffError::Conflict(_) => 409,
            SkiffError::Upstream { .. } => 502,
            SkiffError::UpstreamTimeout => 504,
            SkiffError::Canceled => 499,
            SkiffError::Storage(_) => 500,
            SkiffError::Internal(_) => 500,
        }
    }

    /// Locale key for the human-readable kind prefix.
    pub fn locale_key(&self) -> &'static str {
        match self {
            SkiffError::NotFound { .. } => "error.not_found",
            SkiffError::InvalidRequest(_) => "error.invalid_request",
            SkiffError::Conflict(_) => "error.conflict",
            SkiffError::Upstream { .. } => "error.upstream_failure",
            SkiffError::UpstreamTimeout => "error.upstream_timeout",
            SkiffError::Canceled => "error.canceled",
            SkiffError::Storage(_) => "error.storage_failure",
            SkiffError::Internal(_) => "error.internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_taxonomy() {
        assert_eq!(SkiffError::not_found("conversation").code(), 404);
        assert_eq!(SkiffError::InvalidRequest("x".into()).code(), 400);
        assert_eq!(SkiffError::Conflict("dup".into()).code(), 409);
        assert_eq!(SkiffError::upstream("s", "boom").code(), 502);
        assert_eq!(SkiffError::UpstreamTimeout.code(), 504);
        assert_eq!(SkiffError::Canceled.code(), 499);
    }

    #[test]
    fn test_display_carries_detail() {
        let e = SkiffError::upstream("deepseek", "connection reset");
        assert!(e.to_string().contains("deepseek"));
        assert!(e.to_string().contains("connection reset"));
    }
}
