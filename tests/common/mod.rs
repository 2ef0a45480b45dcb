// tests/common/mod.rs — Shared harness: scripted providers over a temp root

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use skiff::api::ApiState;
use skiff::chat::{ChatEngine, SessionStore};
use skiff::infra::config::{ChatConfig, ManagerConfig, RagConfig};
use skiff::infra::errors::SkiffError;
use skiff::locale::LocaleStore;
use skiff::manager::ModelManager;
use skiff::provider::{ChatDelta, ChatRequest, DeltaStream, ModelProvider, ProviderFactory};
use skiff::rag::RagStore;
use skiff::search::{DisabledSearch, SearchProvider};
use skiff::share::ShareStore;
use skiff::store::ObjectStore;
use skiff::supplier::{Capability, Supplier, SupplierConfig, SupplierModel, SupplierRegistry};

/// Provider that replays scripted delta sequences, one per chat call.
/// With `hang` set the stream never finishes on its own, which lets
/// tests drive cancellation.
pub struct ScriptedProvider {
    scripts: std::sync::Mutex<std::collections::VecDeque<Vec<String>>>,
    fallback: Vec<String>,
    hang: bool,
}

impl ScriptedProvider {
    pub fn new(deltas: &[&str]) -> Self {
        Self {
            scripts: std::sync::Mutex::new(std::collections::VecDeque::new()),
            fallback: deltas.iter().map(|s| s.to_string()).collect(),
            hang: false,
        }
    }

    /// One script per successive chat call; the last one repeats.
    pub fn sequence(scripts: &[&[&str]]) -> Self {
        let queue: std::collections::VecDeque<Vec<String>> = scripts
            .iter()
            .map(|s| s.iter().map(|d| d.to_string()).collect())
            .collect();
        let fallback = queue.back().cloned().unwrap_or_default();
        Self {
            scripts: std::sync::Mutex::new(queue),
            fallback,
            hang: false,
        }
    }

    pub fn hanging(deltas: &[&str]) -> Self {
        let mut p = Self::new(deltas);
        p.hang = true;
        p
    }

    fn next_script(&self) -> Vec<String> {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Canonical basis vectors keyed by keyword, for retrieval tests.
pub fn basis_vector(text: &str) -> Vec<f32> {
    if text.contains("alpha") {
        vec![1.0, 0.0, 0.0]
    } else if text.contains("beta") {
        vec![0.0, 1.0, 0.0]
    } else if text.contains("gamma") {
        vec![0.0, 0.0, 1.0]
    } else {
        vec![1.0, 0.0, 0.0]
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn list_models(&self) -> Result<Vec<String>, SkiffError> {
        Ok(vec!["m".into()])
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<DeltaStream, SkiffError> {
        let deltas = self.next_script();
        let hang = self.hang;
        let stream = async_stream::stream! {
            for delta in deltas {
                yield Ok(ChatDelta {
                    content: delta,
                    reasoning: String::new(),
                    stat: None,
                });
            }
            if hang {
                futures::future::pending::<()>().await;
            } else {
                let mut stat = serde_json::Map::new();
                stat.insert("eval_count".into(), serde_json::json!(2));
                yield Ok(ChatDelta {
                    content: String::new(),
                    reasoning: String::new(),
                    stat: Some(stat),
                });
            }
        };
        Ok(Box::pin(stream))
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, SkiffError> {
        Ok(texts.iter().map(|t| basis_vector(t)).collect())
    }
}

pub struct ScriptedFactory(pub Arc<ScriptedProvider>);

impl ProviderFactory for ScriptedFactory {
    fn provider_for(&self, _supplier: &Supplier) -> Arc<dyn ModelProvider> {
        self.0.clone()
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<ObjectStore>,
    pub registry: Arc<SupplierRegistry>,
    pub sessions: Arc<SessionStore>,
    pub rag: Arc<RagStore>,
    pub engine: Arc<ChatEngine>,
    pub state: ApiState,
}

/// Full stack over a temp data root, with the supplier "mock" carrying a
/// chat model "m" and an embedding model "embed".
pub fn harness(provider: ScriptedProvider) -> Harness {
    harness_with_rag_config(provider, RagConfig::default())
}

pub fn harness_with_rag_config(provider: ScriptedProvider, rag_cfg: RagConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ObjectStore::new(dir.path()));
    let locale = Arc::new(LocaleStore::new(store.clone()));

    let registry = Arc::new(SupplierRegistry::new(store.clone()));
    registry
        .add(SupplierConfig {
            name: "mock".into(),
            title: "Mock".into(),
            base_url: "http://mock.test/v1".into(),
            api_key: String::new(),
        })
        .unwrap();
    registry
        .add_model(
            "mock",
            SupplierModel {
                name: "m".into(),
                title: String::new(),
                parameters: String::new(),
                capabilities: vec![Capability::Chat],
                enabled: true,
            },
        )
        .unwrap();
    registry
        .add_model(
            "mock",
            SupplierModel {
                name: "embed".into(),
                title: String::new(),
                parameters: String::new(),
                capabilities: vec![Capability::Embedding],
                enabled: true,
            },
        )
        .unwrap();

    let providers: Arc<dyn ProviderFactory> = Arc::new(ScriptedFactory(Arc::new(provider)));
    let rag = Arc::new(RagStore::new(
        store.clone(),
        registry.clone(),
        providers.clone(),
        rag_cfg,
    ));
    let sessions = Arc::new(SessionStore::new(store.clone()));
    let shares = Arc::new(ShareStore::new(store.clone(), sessions.clone()));
    let manager = Arc::new(ModelManager::new(
        store.clone(),
        registry.clone(),
        ManagerConfig::default(),
        dir.path().to_path_buf(),
    ));

    let search: Arc<dyn SearchProvider> = Arc::new(DisabledSearch);
    let engine = Arc::new(ChatEngine::new(
        sessions.clone(),
        registry.clone(),
        rag.clone(),
        providers,
        search,
        locale.clone(),
        ChatConfig::default(),
    ));

    let state = ApiState {
        engine: engine.clone(),
        sessions: sessions.clone(),
        registry: registry.clone(),
        rag: rag.clone(),
        manager,
        shares,
        locale,
        upstream_timeout: Duration::from_secs(120),
    };

    Harness {
        dir,
        store,
        registry,
        sessions,
        rag,
        engine,
        state,
    }
}
