// src/api/supplier.rs — Supplier registry endpoints (/model/*)

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::envelope::{respond, Envelope};
use super::ApiState;
use crate::supplier::{SupplierConfig, SupplierModel};

#[derive(Deserialize)]
pub struct SupplierNameRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
}

#[derive(Deserialize)]
pub struct SupplierStatusRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct SetSupplierConfigRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    #[serde(flatten)]
    pub config: SupplierConfig,
}

#[derive(Deserialize)]
pub struct ModelRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    pub model: String,
}

#[derive(Deserialize)]
pub struct AddModelRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    #[serde(flatten)]
    pub model: SupplierModel,
}

#[derive(Deserialize)]
pub struct ModelStatusRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    pub model: String,
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct ModelTitleRequest {
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    pub model: String,
    pub title: String,
}

pub async fn list_suppliers(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.registry.list())
}

pub async fn add_supplier(
    State(state): State<ApiState>,
    Json(cfg): Json<SupplierConfig>,
) -> Envelope {
    respond(&state.locale, state.registry.add(cfg))
}

pub async fn remove_supplier(
    State(state): State<ApiState>,
    Json(req): Json<SupplierNameRequest>,
) -> Envelope {
    respond(&state.locale, state.registry.remove(&req.supplier_name))
}

pub async fn set_supplier_status(
    State(state): State<ApiState>,
    Json(req): Json<SupplierStatusRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.registry.set_status(&req.supplier_name, req.enabled),
    )
}

pub async fn get_supplier_config(
    State(state): State<ApiState>,
    Json(req): Json<SupplierNameRequest>,
) -> Envelope {
    respond(&state.locale, state.registry.get_config(&req.supplier_name))
}

pub async fn set_supplier_config(
    State(state): State<ApiState>,
    Json(req): Json<SetSupplierConfigRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.registry.set_config(&req.supplier_name, req.config),
    )
}

pub async fn check_supplier_config(
    State(state): State<ApiState>,
    Json(req): Json<SupplierNameRequest>,
) -> Envelope {
    let result = state
        .registry
        .check_config(&req.supplier_name, state.upstream_timeout)
        .await;
    match result {
        Ok(()) => Envelope::ok("ok"),
        Err(e) => Envelope::failure(&e, &state.locale),
    }
}

pub async fn list_models(
    State(state): State<ApiState>,
    Json(req): Json<SupplierNameRequest>,
) -> Envelope {
    respond(&state.locale, state.registry.models(&req.supplier_name))
}

pub async fn add_model(
    State(state): State<ApiState>,
    Json(req): Json<AddModelRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.registry.add_model(&req.supplier_name, req.model),
    )
}

pub async fn remove_model(
    State(state): State<ApiState>,
    Json(req): Json<ModelRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state.registry.remove_model(&req.supplier_name, &req.model),
    )
}

pub async fn set_model_status(
    State(state): State<ApiState>,
    Json(req): Json<ModelStatusRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state
            .registry
            .set_model_status(&req.supplier_name, &req.model, req.enabled),
    )
}

pub async fn set_model_title(
    State(state): State<ApiState>,
    Json(req): Json<ModelTitleRequest>,
) -> Envelope {
    respond(
        &state.locale,
        state
            .registry
            .set_model_title(&req.supplier_name, &req.model, &req.title),
    )
}

pub async fn list_embedding_models(State(state): State<ApiState>) -> Envelope {
    respond(&state.locale, state.registry.list_embedding_models())
}
