// src/supplier/mod.rs — Model supplier registry

mod registry;

pub use registry::SupplierRegistry;

use serde::{Deserialize, Serialize};

/// A named model provider with credentials and a model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    /// Unique key. Generated (10 random alphanumerics) when the caller
    /// does not supply one.
    pub name: String,
    /// Display title shown by the UI.
    #[serde(default)]
    pub title: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Exactly one supplier may be local; it fronts the managed runtime.
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub models: Vec<SupplierModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierModel {
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Parameter tag, e.g. "7b". For the local supplier `name:parameters`
    /// identifies the installed runtime artifact.
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SupplierModel {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Embedding,
    Vision,
    Tools,
}

/// Mutable subset of a supplier accepted from the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierConfig {
    #[serde(default, rename = "supplierName")]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Flat embedding-model reference returned by `list_embedding_models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelRef {
    #[serde(rename = "supplierName")]
    pub supplier: String,
    pub model: String,
    pub title: String,
}

fn default_true() -> bool {
    true
}
