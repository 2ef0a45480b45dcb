// src/provider/mod.rs — Model provider layer

pub mod local;
pub mod openai_compat;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::infra::errors::SkiffError;
use crate::supplier::Supplier;

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, SkiffError>> + Send>>;

/// Core trait both upstream kinds implement: the managed local runtime
/// (ollama-compatible, NDJSON) and third-party OpenAI-compatible endpoints
/// (SSE).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Model names the endpoint reports. Doubles as the config probe.
    async fn list_models(&self) -> Result<Vec<String>, SkiffError>;

    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, SkiffError>;

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, SkiffError>;
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One incremental chunk of assistant output.
#[derive(Debug, Clone, Default)]
pub struct ChatDelta {
    pub content: String,
    /// Reasoning prefix, when the model separates thinking from the answer.
    pub reasoning: String,
    /// Upstream statistics, present on the terminal chunk only.
    pub stat: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Maps a supplier record to a concrete provider. The HTTP factory is the
/// production implementation; tests substitute scripted providers.
pub trait ProviderFactory: Send + Sync {
    fn provider_for(&self, supplier: &Supplier) -> Arc<dyn ModelProvider>;
}

pub struct HttpProviderFactory {
    timeout: Duration,
}

impl HttpProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn provider_for(&self, supplier: &Supplier) -> Arc<dyn ModelProvider> {
        if supplier.is_local {
            Arc::new(local::LocalProvider::new(
                supplier.base_url.clone(),
                self.timeout,
            ))
        } else {
            Arc::new(openai_compat::OpenAiCompatProvider::new(
                supplier.name.clone(),
                supplier.base_url.clone(),
                supplier.api_key.clone(),
                self.timeout,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_wire_message_constructors() {
        let m = WireMessage::user("hi");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hi");
        assert_eq!(WireMessage::system("s").role, Role::System);
        assert_eq!(WireMessage::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let s = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(s, "\"assistant\"");
    }
}
