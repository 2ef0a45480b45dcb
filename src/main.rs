// src/main.rs — Skiff entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skiff::api::{self, ApiState};
use skiff::chat::{ChatEngine, SessionStore};
use skiff::infra::config::Config;
use skiff::infra::{logger, paths};
use skiff::locale::LocaleStore;
use skiff::manager::ModelManager;
use skiff::provider::{HttpProviderFactory, ProviderFactory};
use skiff::rag::{worker, RagStore};
use skiff::search::{DisabledSearch, SearchProvider};
use skiff::share::ShareStore;
use skiff::store::ObjectStore;
use skiff::supplier::SupplierRegistry;

/// Backend daemon for the Skiff desktop assistant. Configured entirely
/// through flags or environment; no positional arguments.
#[derive(Parser, Debug)]
#[command(name = "skiff", version, about)]
struct Cli {
    /// Root directory for all persisted state.
    #[arg(long, env = "DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Loopback address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:7071")]
    bind_addr: String,

    /// Default log filter (RUST_LOG overrides).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_root = cli.data_root.unwrap_or_else(paths::default_data_root);
    std::fs::create_dir_all(&data_root)?;
    let config = Config::load(&data_root)?;
    let upstream_timeout = Duration::from_secs(config.upstream.timeout_secs);

    let store = Arc::new(ObjectStore::new(&data_root));
    let locale = Arc::new(LocaleStore::new(store.clone()));

    let registry = Arc::new(SupplierRegistry::new(store.clone()));
    registry.ensure_local(&config.manager.runtime_url)?;

    let providers: Arc<dyn ProviderFactory> = Arc::new(HttpProviderFactory::new(upstream_timeout));

    let rag = Arc::new(RagStore::new(
        store.clone(),
        registry.clone(),
        providers.clone(),
        config.rag.clone(),
    ));
    // Normalise any legacy vector layout before serving queries.
    rag.switch_to_cosine_index()?;

    let sessions = Arc::new(SessionStore::new(store.clone()));
    let shares = Arc::new(ShareStore::new(store.clone(), sessions.clone()));

    let manager = Arc::new(ModelManager::new(
        store.clone(),
        registry.clone(),
        config.manager.clone(),
        data_root.clone(),
    ));
    match manager.start_runtime() {
        Ok(true) => {
            // Give the runtime a moment to bind, then mirror its catalog.
            let manager = manager.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                if let Err(e) = manager.refresh_installed().await {
                    tracing::debug!("initial model catalog refresh skipped: {}", e);
                }
            });
        }
        Ok(false) => tracing::info!("managed runtime not installed; local models unavailable"),
        Err(e) => tracing::warn!("managed runtime failed to start: {}", e),
    }

    let search: Arc<dyn SearchProvider> = Arc::new(DisabledSearch);
    let engine = Arc::new(ChatEngine::new(
        sessions.clone(),
        registry.clone(),
        rag.clone(),
        providers,
        search,
        locale.clone(),
        config.chat.clone(),
    ));

    let parse_worker = worker::spawn(rag.clone());

    let state = ApiState {
        engine,
        sessions,
        registry,
        rag,
        manager: manager.clone(),
        shares,
        locale,
        upstream_timeout,
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    };
    let result = api::start_server(&cli.bind_addr, state, shutdown).await;

    parse_worker.abort();
    manager.shutdown().await;
    result
}
