// src/api/rag.rs — Knowledge base endpoints (/rag/*)

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::envelope::{respond, Envelope};
use super::ApiState;
use crate::rag::RagUpsert;

#[derive(Deserialize)]
pub struct RagNameRequest {
    #[serde(rename = "ragName")]
    pub rag_name: String,
}

#[derive(Deserialize)]
pub struct UploadDocRequest {
    #[serde(rename = "ragName")]
    pub rag_name: String,
    #[serde(rename = "filePaths")]
    pub file_paths: Vec<String>,
}

#[derive(Deserialize)]
pub struct DocContentQuery {
    #[serde(rename = "ragName")]
    pub rag_name: String,
    #[serde(rename = "docId")]
    pub doc_id: String,
}

#[derive(Deserialize)]
pub struct RemoveDocQuery {
    #[serde(rename = "ragName")]
    pub rag_name: String,
    /// Comma-separated document ids (GET endpoint).
    #[serde(rename = "docIds")]
    pub doc_ids: String,
}

pub async fn create_rag(State(state): State<ApiState>, Json(req): Json<RagUpsert>) -> Envelope {
    respond(&state.locale, state.rag.create(req))
}

pub async fn modify_rag(State(state): State<ApiState>, Json(req): Json<RagUpsert>) -> Envelope {
    respond(&state.locale, state.rag.modify(req))
}

pub async fn remove_rag(
    State(state): State<ApiState>,
    Json(req): Json<RagNameRequest>,
) -> Envelope {
    respond(&state.locale, state.rag.remove(&req.rag_name))
}

pub async fn list_rag(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.rag.list())
}

/// POST /rag/upload_doc — registers pending documents; the parse worker
/// picks them up asynchronously. `list_docs` sees them immediately.
pub async fn upload_doc(
    State(state): State<ApiState>,
    Json(req): Json<UploadDocRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.rag.upload_docs(&req.rag_name, &req.file_paths),
    )
}

pub async fn list_docs(
    State(state): State<ApiState>,
    Json(req): Json<RagNameRequest>,
) -> Envelope {
    respond(&state.locale, state.rag.list_docs(&req.rag_name))
}

/// GET /rag/get_doc_content?ragName=…&docId=…
pub async fn get_doc_content(
    State(state): State<ApiState>,
    Query(query): Query<DocContentQuery>,
) -> Envelope {
    respond(
        &state.locale,
        state.rag.doc_content(&query.rag_name, &query.doc_id),
    )
}

/// GET /rag/remove_doc?ragName=…&docIds=a,b,c
pub async fn remove_doc(
    State(state): State<ApiState>,
    Query(query): Query<RemoveDocQuery>,
) -> Envelope {
    let ids: Vec<String> = query
        .doc_ids
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    respond(&state.locale, state.rag.remove_docs(&query.rag_name, &ids))
}
