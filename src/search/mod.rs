// src/search/mod.rs — Web search collaborator seam
//
// The real fetcher lives in the desktop shell; the daemon only needs a
// function that turns a query into scored snippets it can cite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::SkiffError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, engine: &str, query: &str) -> Result<Vec<SearchHit>, SkiffError>;
}

/// Inert default. A chat with `search` set still succeeds, it just carries
/// no results until the shell wires a real fetcher in.
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    async fn search(&self, _engine: &str, _query: &str) -> Result<Vec<SearchHit>, SkiffError> {
        Ok(Vec::new())
    }
}
