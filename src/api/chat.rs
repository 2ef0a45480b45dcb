// src/api/chat.rs — Conversation endpoints, including the token stream

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;

use super::envelope::{respond, Envelope};
use super::ApiState;
use crate::chat::{ChatOutcome, ChatSendRequest};
use crate::supplier::Capability;

#[derive(Deserialize)]
pub struct ContextIdRequest {
    pub context_id: String,
}

#[derive(Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: String,
    pub model: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
}

#[derive(Deserialize)]
pub struct ModifyTitleRequest {
    pub context_id: String,
    pub title: String,
}

pub async fn get_chat_list(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.sessions.list())
}

pub async fn create_chat(
    State(state): State<ApiState>,
    Json(req): Json<CreateChatRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state
            .sessions
            .create(&req.title, &req.model, &req.parameters, &req.supplier_name),
    )
}

pub async fn get_chat_info(
    State(state): State<ApiState>,
    Json(req): Json<ContextIdRequest>,
) -> Envelope {
    let result = state.sessions.require(&req.context_id).and_then(|config| {
        let history = state.sessions.history(&req.context_id)?;
        Ok(serde_json::json!({ "config": config, "history": history }))
    });
    respond(&state.locale, result)
}

pub async fn get_last_chat_history(
    State(state): State<ApiState>,
    Json(req): Json<ContextIdRequest>,
) -> Envelope {
    let result = state
        .sessions
        .require(&req.context_id)
        .and_then(|_| state.sessions.last_turn(&req.context_id));
    respond(&state.locale, result)
}

pub async fn remove_chat(
    State(state): State<ApiState>,
    Json(req): Json<ContextIdRequest>,
) -> Envelope {
    respond(&state.locale, state.sessions.remove(&req.context_id))
}

pub async fn modify_chat_title(
    State(state): State<ApiState>,
    Json(req): Json<ModifyTitleRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.sessions.set_title(&req.context_id, &req.title),
    )
}

/// POST /chat/stop_generate — idempotent: stopping an idle conversation
/// is a successful no-op.
pub async fn stop_generate(
    State(state): State<ApiState>,
    Json(req): Json<ContextIdRequest>,
) -> Envelope {
    state.engine.stop_generate(&req.context_id);
    Envelope::ok(serde_json::json!({ "stopped": true }))
}

/// POST /chat/get_model_list — flat list of chat-capable models across
/// enabled suppliers.
pub async fn get_model_list(State(state): State<ApiState>) -> Envelope {
    let result = state.registry.list().map(|suppliers| {
        let mut out = Vec::new();
        for supplier in suppliers.iter().filter(|s| s.enabled) {
            for model in supplier.models.iter().filter(|m| m.enabled) {
                if !model.has_capability(Capability::Chat) {
                    continue;
                }
                out.push(serde_json::json!({
                    "supplierName": supplier.name,
                    "model": model.name,
                    "title": if model.title.is_empty() { &model.name } else { &model.title },
                    "parameters": model.parameters,
                    "capabilities": model.capabilities,
                }));
            }
        }
        out
    });
    respond(&state.locale, result)
}

/// POST /chat/chat — chunked text/plain stream of assistant tokens.
///
/// Validation failures answer with the JSON envelope before any byte is
/// streamed; the new conversation id (implicit create) rides in the
/// X-Context-Id header.
pub async fn chat(State(state): State<ApiState>, Json(req): Json<ChatSendRequest>) -> Response {
    match state.engine.start_chat(req).await {
        Ok(ChatOutcome { context_id, mut rx }) => {
            let stream = async_stream::stream! {
                while let Some(chunk) = rx.recv().await {
                    yield Ok::<String, Infallible>(chunk);
                }
            };
            let built = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header("X-Context-Id", context_id.as_str())
                .body(Body::from_stream(stream));
            match built {
                Ok(response) => response,
                Err(e) => Envelope::failure(
                    &crate::infra::errors::SkiffError::Internal(anyhow::anyhow!(e)),
                    &state.locale,
                )
                .into_response(),
            }
        }
        Err(e) => Envelope::failure(&e, &state.locale).into_response(),
    }
}
