// src/api/share.rs — Conversation sharing endpoints (/share/*)

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::envelope::{respond, Envelope};
use super::ApiState;

#[derive(Deserialize)]
pub struct CreateShareRequest {
    pub context_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct ShareIdRequest {
    pub share_id: String,
}

pub async fn create_share(
    State(state): State<ApiState>,
    Json(req): Json<CreateShareRequest>,
) -> Envelope {
    respond(&state.locale, state.shares.create(&req.context_id, req.title))
}

pub async fn get_share_list(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.shares.list())
}

pub async fn get_share_info(
    State(state): State<ApiState>,
    Json(req): Json<ShareIdRequest>,
) -> Envelope {
    respond(&state.locale, state.shares.get(&req.share_id))
}

pub async fn remove_share(
    State(state): State<ApiState>,
    Json(req): Json<ShareIdRequest>,
) -> Envelope {
    respond(&state.locale, state.shares.remove(&req.share_id))
}
