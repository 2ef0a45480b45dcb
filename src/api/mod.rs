// src/api/mod.rs — Loopback HTTP server for the desktop shell

pub mod chat;
pub mod envelope;
pub mod index;
pub mod manager;
pub mod rag;
pub mod share;
pub mod supplier;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::chat::{ChatEngine, SessionStore};
use crate::locale::LocaleStore;
use crate::manager::ModelManager;
use crate::rag::RagStore;
use crate::share::ShareStore;
use crate::supplier::SupplierRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ChatEngine>,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<SupplierRegistry>,
    pub rag: Arc<RagStore>,
    pub manager: Arc<ModelManager>,
    pub shares: Arc<ShareStore>,
    pub locale: Arc<LocaleStore>,
    pub upstream_timeout: Duration,
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    // The shell's renderer runs on an app-scheme origin; loopback binding
    // is the real boundary, so CORS stays permissive.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/index/get_version", get(index::get_version))
        .route("/index/get_languages", post(index::get_languages))
        .route("/index/set_language", post(index::set_language))
        .route("/chat/get_chat_list", post(chat::get_chat_list))
        .route("/chat/create_chat", post(chat::create_chat))
        .route("/chat/get_chat_info", post(chat::get_chat_info))
        .route("/chat/get_last_chat_history", post(chat::get_last_chat_history))
        .route("/chat/remove_chat", post(chat::remove_chat))
        .route("/chat/modify_chat_title", post(chat::modify_chat_title))
        .route("/chat/stop_generate", post(chat::stop_generate))
        .route("/chat/get_model_list", post(chat::get_model_list))
        .route("/chat/chat", post(chat::chat))
        .route("/manager/install_model", post(manager::install_model))
        .route("/manager/get_model_install_progress", post(manager::get_model_install_progress))
        .route("/manager/remove_model", post(manager::remove_model))
        .route("/manager/list_installed_models", post(manager::list_installed_models))
        .route("/manager/list_visible_models", post(manager::list_visible_models))
        .route("/manager/install_model_manager", post(manager::install_model_manager))
        .route(
            "/manager/get_model_manager_install_progress",
            post(manager::get_model_manager_install_progress),
        )
        .route("/manager/reconnect_model_download", post(manager::reconnect_model_download))
        .route("/rag/create_rag", post(rag::create_rag))
        .route("/rag/modify_rag", post(rag::modify_rag))
        .route("/rag/remove_rag", post(rag::remove_rag))
        .route("/rag/list_rag", post(rag::list_rag))
        .route("/rag/upload_doc", post(rag::upload_doc))
        .route("/rag/list_docs", post(rag::list_docs))
        .route("/rag/get_doc_content", get(rag::get_doc_content))
        .route("/rag/remove_doc", get(rag::remove_doc))
        .route("/model/list_suppliers", post(supplier::list_suppliers))
        .route("/model/add_supplier", post(supplier::add_supplier))
        .route("/model/remove_supplier", post(supplier::remove_supplier))
        .route("/model/set_supplier_status", post(supplier::set_supplier_status))
        .route("/model/get_supplier_config", post(supplier::get_supplier_config))
        .route("/model/set_supplier_config", post(supplier::set_supplier_config))
        .route("/model/check_supplier_config", post(supplier::check_supplier_config))
        .route("/model/list_models", post(supplier::list_models))
        .route("/model/add_model", post(supplier::add_model))
        .route("/model/remove_model", post(supplier::remove_model))
        .route("/model/set_model_status", post(supplier::set_model_status))
        .route("/model/set_model_title", post(supplier::set_model_title))
        .route("/model/list_embedding_models", post(supplier::list_embedding_models))
        .route("/share/create_share", post(share::create_share))
        .route("/share/get_share_list", post(share::get_share_list))
        .route("/share/get_share_info", post(share::get_share_info))
        .route("/share/remove_share", post(share::remove_share))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address (blocking until shutdown).
pub async fn start_server(
    bind_addr: &str,
    state: ApiState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let router = build_router(state);

    tracing::info!("API server listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
