// src/chat/engine.rs — Streaming chat engine
//
// The engine owns the in-flight request per conversation. Deltas are
// fanned out to the client while being buffered server-side; the buffer,
// not the client, is what gets persisted, so a closed tab never loses a
// turn. At most one stream per conversation: a second send cancels and
// replaces the first.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use super::history::{assemble_context, TurnEntry};
use super::sessions::SessionStore;
use crate::infra::config::ChatConfig;
use crate::infra::errors::SkiffError;
use crate::locale::LocaleStore;
use crate::provider::{ChatRequest, ProviderFactory};
use crate::rag::{build_preamble, RagStore};
use crate::search::SearchProvider;
use crate::supplier::{Capability, Supplier, SupplierModel, SupplierRegistry};
use crate::util;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSendRequest {
    pub model: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub context_id: String,
    #[serde(rename = "supplierName", default)]
    pub supplier_name: String,
    /// Web search engine name; empty disables search.
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub rag_list: Vec<String>,
    #[serde(default)]
    pub temp_chat: bool,
    pub user_content: String,
    #[serde(default)]
    pub doc_files: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub regenerate_id: Option<String>,
}

/// A started stream: the conversation it belongs to plus the delta feed.
pub struct ChatOutcome {
    pub context_id: String,
    pub rx: mpsc::Receiver<String>,
}

struct ActiveStream {
    generation: u64,
    cancel: watch::Sender<bool>,
}

pub struct ChatEngine {
    sessions: Arc<SessionStore>,
    registry: Arc<SupplierRegistry>,
    rag: Arc<RagStore>,
    providers: Arc<dyn ProviderFactory>,
    search: Arc<dyn SearchProvider>,
    locale: Arc<LocaleStore>,
    cfg: ChatConfig,
    active: Mutex<HashMap<String, ActiveStream>>,
    generation: AtomicU64,
}

impl ChatEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionStore>,
        registry: Arc<SupplierRegistry>,
        rag: Arc<RagStore>,
        providers: Arc<dyn ProviderFactory>,
        search: Arc<dyn SearchProvider>,
        locale: Arc<LocaleStore>,
        cfg: ChatConfig,
    ) -> Self {
        Self {
            sessions,
            registry,
            rag,
            providers,
            search,
            locale,
            cfg,
            active: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve the supplier and model for a send. A supplier that was
    /// removed while conversations still reference it is an invalid
    /// request (the history stays readable, only new sends fail).
    fn resolve(&self, req: &ChatSendRequest) -> Result<(Supplier, SupplierModel), SkiffError> {
        let supplier = self.registry.get(&req.supplier_name)?.ok_or_else(|| {
            SkiffError::InvalidRequest(format!(
                "supplier '{}' is not configured",
                req.supplier_name
            ))
        })?;
        if !supplier.enabled {
            return Err(SkiffError::Conflict(format!(
                "supplier '{}' is disabled",
                supplier.name
            )));
        }
        let model = supplier
            .models
            .iter()
            .find(|m| {
                m.name == req.model
                    && (!supplier.is_local
                        || req.parameters.is_empty()
                        || m.parameters == req.parameters)
            })
            .cloned()
            .ok_or_else(|| SkiffError::not_found(format!("model '{}'", req.model)))?;
        if !model.enabled {
            return Err(SkiffError::Conflict(format!(
                "model '{}' is disabled",
                model.name
            )));
        }
        if !model.has_capability(Capability::Chat) {
            return Err(SkiffError::InvalidRequest(format!(
                "model '{}' cannot chat",
                model.name
            )));
        }
        Ok((supplier, model))
    }

    /// Start a chat stream. Everything that can fail with an envelope
    /// error happens here, before any byte reaches the client; in
    /// particular a send with an unknown model never persists the
    /// implicitly-created conversation.
    pub async fn start_chat(self: &Arc<Self>, req: ChatSendRequest) -> Result<ChatOutcome, SkiffError> {
        if req.user_content.trim().is_empty() {
            return Err(SkiffError::InvalidRequest("user_content is empty".into()));
        }

        let (supplier, _model) = self.resolve(&req)?;

        // Implicit create: an empty context_id means "new conversation",
        // titled by the first message. Temp chats never touch disk.
        let context_id = if req.context_id.is_empty() {
            if req.temp_chat {
                util::new_id()
            } else {
                self.sessions
                    .create(&req.user_content, &req.model, &req.parameters, &supplier.name)?
                    .id
            }
        } else {
            self.sessions.require(&req.context_id)?.id
        };

        if let Some(ref regen_id) = req.regenerate_id {
            if !req.temp_chat {
                self.sessions.truncate_for_regenerate(&context_id, regen_id)?;
            }
        }

        // Web search, then RAG retrieval; both feed the prompt preamble
        // and the search hits are recorded on the assistant entry.
        let search_hits = if req.search.is_empty() {
            None
        } else {
            Some(self.search.search(&req.search, &req.user_content).await?)
        };

        let mut preamble = String::new();
        if let Some(ref hits) = search_hits {
            if !hits.is_empty() {
                preamble.push_str("Web search results:\n");
                for (i, hit) in hits.iter().enumerate() {
                    preamble.push_str(&format!("[{}] {} ({})\n{}\n", i + 1, hit.title, hit.url, hit.snippet));
                }
                preamble.push('\n');
            }
        }
        if !req.rag_list.is_empty() {
            let snippets = self.rag.retrieve(&req.rag_list, &req.user_content).await?;
            if !snippets.is_empty() {
                preamble.push_str(&build_preamble(&snippets));
            }
        }

        let history = self.sessions.history(&context_id)?;
        let prompt = if preamble.is_empty() {
            req.user_content.clone()
        } else {
            format!("{preamble}{}", req.user_content)
        };
        let messages = assemble_context(&history, &prompt, self.cfg.context_length);

        let provider = self.providers.provider_for(&supplier);
        let upstream = provider
            .chat_stream(ChatRequest {
                model: req.model.clone(),
                messages,
                temperature: None,
            })
            .await?;

        // Register as the conversation's single in-flight stream,
        // cancelling any previous one (cancel-and-replace).
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(prev) = active.insert(
                context_id.clone(),
                ActiveStream {
                    generation,
                    cancel: cancel_tx,
                },
            ) {
                let _ = prev.cancel.send(true);
            }
        }

        let (tx, rx) = mpsc::channel::<String>(64);
        let engine = Arc::clone(self);
        let ctx = context_id.clone();
        tokio::spawn(async move {
            engine
                .pump(ctx, generation, req, search_hits, upstream, tx, cancel_rx)
                .await;
        });

        Ok(ChatOutcome { context_id, rx })
    }

    /// Drive the upstream stream to completion, fanning deltas out to the
    /// client and buffering for persistence.
    #[allow(clippy::too_many_arguments)]
    async fn pump(
        &self,
        context_id: String,
        generation: u64,
        req: ChatSendRequest,
        search_hits: Option<Vec<crate::search::SearchHit>>,
        mut upstream: crate::provider::DeltaStream,
        tx: mpsc::Sender<String>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        use futures::StreamExt;

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut stat = serde_json::Map::new();
        let mut interrupted = false;
        let mut upstream_error: Option<SkiffError> = None;

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    interrupted = true;
                    break;
                }
                item = upstream.next() => match item {
                    None => break,
                    Some(Ok(delta)) => {
                        if let Some(s) = delta.stat {
                            for (k, v) in s {
                                stat.insert(k, v);
                            }
                        }
                        if !delta.reasoning.is_empty() {
                            reasoning.push_str(&delta.reasoning);
                            if tx.send(delta.reasoning).await.is_err() {
                                // Client went away: same as stop_generate.
                                interrupted = true;
                                break;
                            }
                        }
                        if !delta.content.is_empty() {
                            content.push_str(&delta.content);
                            if tx.send(delta.content).await.is_err() {
                                interrupted = true;
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        upstream_error = Some(e);
                        interrupted = true;
                        break;
                    }
                },
            }
        }

        // Deregister, unless a replacement stream already took the slot.
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if active
                .get(&context_id)
                .is_some_and(|a| a.generation == generation)
            {
                active.remove(&context_id);
            }
        }

        if let Some(ref e) = upstream_error {
            tracing::warn!("upstream error on '{}': {}", context_id, e);
            // Trailing marker so the client knows the stream died rather
            // than completed.
            let _ = tx
                .send(format!("\n{}", self.locale.text("chat.interrupted")))
                .await;
        }

        if req.temp_chat {
            return;
        }

        let assistant_content = if interrupted {
            format!("{}{}", content, self.locale.text("chat.interrupted"))
        } else {
            content
        };

        let mut user_entry = TurnEntry::user(req.user_content.clone());
        user_entry.doc_files = req.doc_files.clone();
        user_entry.images = req.images.clone();

        let mut assistant_entry = TurnEntry::assistant(assistant_content);
        if !reasoning.is_empty() {
            assistant_entry.reasoning = Some(reasoning);
        }
        assistant_entry.stat = stat;
        if !req.search.is_empty() {
            assistant_entry.search_result = search_hits;
            assistant_entry.search_type = Some(req.search.clone());
            assistant_entry.search_query = Some(req.user_content.clone());
        }

        if let Err(e) = self
            .sessions
            .append_pair(&context_id, user_entry, assistant_entry)
        {
            tracing::error!("failed to persist turn for '{}': {}", context_id, e);
        }
    }

    /// Cancel the in-flight stream for a conversation. Idempotent: with
    /// nothing in flight this is a successful no-op.
    pub fn stop_generate(&self, context_id: &str) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stream) = active.get(context_id) {
            let _ = stream.cancel.send(true);
        }
    }

    pub fn has_active(&self, context_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(context_id)
    }
}
