// src/api/manager.rs — Model manager endpoints (/manager/*)

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::envelope::{respond, Envelope};
use super::ApiState;
use crate::manager::visible_models;

#[derive(Deserialize)]
pub struct ModelRequest {
    pub model: String,
    #[serde(default)]
    pub parameters: String,
}

#[derive(Deserialize)]
pub struct ManagerInstallRequest {
    #[serde(rename = "managerName")]
    pub manager_name: String,
}

/// POST /manager/install_model — non-blocking; returns the job, which the
/// client polls. Installing a model already done is a no-op returning done.
pub async fn install_model(
    State(state): State<ApiState>,
    Json(req): Json<ModelRequest>,
) -> Envelope {
    Envelope::ok(state.manager.install_model(&req.model, &req.parameters))
}

pub async fn get_model_install_progress(
    State(state): State<ApiState>,
    Json(req): Json<ModelRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state
            .manager
            .model_install_progress(&req.model, &req.parameters),
    )
}

pub async fn remove_model(
    State(state): State<ApiState>,
    Json(req): Json<ModelRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.manager.remove_model(&req.model, &req.parameters).await,
    )
}

pub async fn list_installed_models(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.manager.list_installed())
}

pub async fn list_visible_models(State(_state): State<ApiState>) -> Envelope {
    Envelope::ok(visible_models())
}

pub async fn install_model_manager(
    State(state): State<ApiState>,
    Json(req): Json<ManagerInstallRequest>,
) -> Envelope {
    Envelope::ok(state.manager.install_manager(&req.manager_name))
}

pub async fn get_model_manager_install_progress(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.manager.manager_install_progress())
}

/// POST /manager/reconnect_model_download — rotate mirrors; restarts a
/// failed bootstrap download on the new mirror.
pub async fn reconnect_model_download(State(state): State<ApiState>) -> Envelope {
    match state.manager.reconnect_model_download() {
        Some(job) => Envelope::ok(job),
        None => Envelope::ok(serde_json::json!({
            "mirror": state.manager.current_mirror(),
        })),
    }
}
