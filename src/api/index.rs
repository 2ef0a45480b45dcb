// src/api/index.rs — Service metadata and localisation endpoints

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::envelope::{respond, Envelope};
use super::ApiState;
use crate::locale;

/// GET /index/get_version
pub async fn get_version() -> Envelope {
    Envelope::ok(env!("CARGO_PKG_VERSION"))
}

/// POST /index/get_languages
pub async fn get_languages(State(state): State<ApiState>) -> Envelope {
    Envelope::ok(serde_json::json!({
        "languages": locale::languages(),
        "current": state.locale.current(),
    }))
}

#[derive(Deserialize)]
pub struct SetLanguageRequest {
    pub language: String,
}

/// POST /index/set_language
pub async fn set_language(
    State(state): State<ApiState>,
    Json(req): Json<SetLanguageRequest>,
) -> Envelope {
    respond(&state.locale, state.locale.set_language(&req.language))
}
