// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Context window in the coarse character-count proxy. Half of it is
    /// the budget for historical turns during context assembly.
    pub context_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_length: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Upper bound on chunk size, in characters.
    pub chunk_chars: usize,
    /// Top-k per knowledge base at retrieval time.
    pub per_base_k: usize,
    /// Global cap after merging results across bases.
    pub global_k: usize,
    /// Length of the document abstract recorded after parsing.
    pub abstract_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 1000,
            per_base_k: 4,
            global_k: 8,
            abstract_chars: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Per-call timeout for chat and embedding requests, in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base URL of the managed local runtime.
    pub runtime_url: String,
    /// Directory (relative to the data root) the runtime is sandboxed in.
    pub runtime_dir: String,
    /// Download mirrors for the runtime archive, tried in order.
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            runtime_url: "http://127.0.0.1:11434".into(),
            runtime_dir: "runtime".into(),
            mirrors: default_mirrors(),
        }
    }
}

fn default_mirrors() -> Vec<String> {
    vec![
        "https://dl.skiff.app/runtime".into(),
        "https://mirror.skiff.app/runtime".into(),
    ]
}

impl Config {
    /// Load config from `config.toml` under the data root, falling back to
    /// defaults when the file is absent.
    pub fn load(data_root: &Path) -> anyhow::Result<Self> {
        let path = data_root.join("config.toml");
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.chat.context_length, 8192);
        assert_eq!(c.rag.per_base_k, 4);
        assert_eq!(c.rag.global_k, 8);
        assert_eq!(c.upstream.timeout_secs, 120);
        assert!(!c.manager.mirrors.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rag.chunk_chars, 1000);
    }

    #[test]
    fn test_parse_partial_override() {
        let config: Config = toml::from_str("[chat]\ncontext_length = 2048\n").unwrap();
        assert_eq!(config.chat.context_length, 2048);
        assert_eq!(config.rag.per_base_k, 4);
    }
}
