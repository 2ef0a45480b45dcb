// src/supplier/registry.rs — CRUD over suppliers and their model catalogs
//
// One JSON file per supplier under suppliers/, with an in-memory cache
// invalidated on every write. The registry mutex is held only for short
// map operations; probes run without it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Capability, EmbeddingModelRef, Supplier, SupplierConfig, SupplierModel};
use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::provider::{local::LocalProvider, openai_compat::OpenAiCompatProvider, ModelProvider};
use crate::store::ObjectStore;
use crate::util;

pub const LOCAL_SUPPLIER: &str = "local";

const NAME_LEN: usize = 10;
const NAME_RETRIES: usize = 16;

pub struct SupplierRegistry {
    store: Arc<ObjectStore>,
    cache: Mutex<Option<HashMap<String, Supplier>>>,
}

impl SupplierRegistry {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    fn load_all(&self) -> Result<HashMap<String, Supplier>, SkiffError> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ref map) = *cache {
                return Ok(map.clone());
            }
        }
        let mut map = HashMap::new();
        for file in self.store.list("suppliers")? {
            let Some(name) = file.strip_suffix(".json") else {
                continue;
            };
            if let Some(supplier) = self.store.read::<Supplier>(&paths::supplier_file(name))? {
                map.insert(supplier.name.clone(), supplier);
            }
        }
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some(map.clone());
        Ok(map)
    }

    fn persist(&self, supplier: &Supplier) -> Result<(), SkiffError> {
        self.store
            .write(&paths::supplier_file(&supplier.name), supplier)?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn list(&self) -> Result<Vec<Supplier>, SkiffError> {
        let map = self.load_all()?;
        let mut suppliers: Vec<Supplier> = map.into_values().collect();
        // Local first, then alphabetical: the order the UI presents them in.
        suppliers.sort_by(|a, b| b.is_local.cmp(&a.is_local).then(a.name.cmp(&b.name)));
        Ok(suppliers)
    }

    pub fn get(&self, name: &str) -> Result<Option<Supplier>, SkiffError> {
        Ok(self.load_all()?.remove(name))
    }

    /// Add a third-party supplier. An empty name is filled with a random
    /// 10-character alphanumeric key; uniqueness is enforced by retry.
    pub fn add(&self, cfg: SupplierConfig) -> Result<Supplier, SkiffError> {
        if cfg.base_url.trim().is_empty() {
            return Err(SkiffError::InvalidRequest("base_url is required".into()));
        }

        let map = self.load_all()?;
        let name = if cfg.name.trim().is_empty() {
            let mut generated = None;
            for _ in 0..NAME_RETRIES {
                let candidate = util::random_alnum(NAME_LEN);
                if !map.contains_key(&candidate) {
                    generated = Some(candidate);
                    break;
                }
            }
            generated.ok_or_else(|| {
                SkiffError::Internal(anyhow::anyhow!("could not generate a unique supplier name"))
            })?
        } else {
            if map.contains_key(cfg.name.trim()) {
                return Err(SkiffError::Conflict(format!(
                    "supplier '{}' already exists",
                    cfg.name.trim()
                )));
            }
            cfg.name.trim().to_string()
        };

        let supplier = Supplier {
            name,
            title: cfg.title,
            base_url: cfg.base_url,
            api_key: cfg.api_key,
            enabled: true,
            is_local: false,
            models: Vec::new(),
        };
        self.persist(&supplier)?;
        Ok(supplier)
    }

    /// Remove a supplier and its models. Conversation history referencing
    /// it stays readable; only new sends fail.
    pub fn remove(&self, name: &str) -> Result<(), SkiffError> {
        let supplier = self
            .get(name)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{name}'")))?;
        if supplier.is_local {
            return Err(SkiffError::Conflict(
                "the local supplier cannot be removed".into(),
            ));
        }
        self.store.remove(&paths::supplier_file(name))?;
        self.invalidate();
        Ok(())
    }

    pub fn set_status(&self, name: &str, enabled: bool) -> Result<(), SkiffError> {
        let mut supplier = self
            .get(name)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{name}'")))?;
        supplier.enabled = enabled;
        self.persist(&supplier)
    }

    pub fn get_config(&self, name: &str) -> Result<SupplierConfig, SkiffError> {
        let supplier = self
            .get(name)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{name}'")))?;
        Ok(SupplierConfig {
            name: supplier.name,
            title: supplier.title,
            base_url: supplier.base_url,
            api_key: supplier.api_key,
        })
    }

    pub fn set_config(&self, name: &str, cfg: SupplierConfig) -> Result<(), SkiffError> {
        let mut supplier = self
            .get(name)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{name}'")))?;
        if !cfg.base_url.trim().is_empty() {
            supplier.base_url = cfg.base_url;
        }
        supplier.title = cfg.title;
        supplier.api_key = cfg.api_key;
        self.persist(&supplier)
    }

    /// Probe the supplier's endpoint (list-models). Read-only: a failed
    /// probe changes nothing.
    pub async fn check_config(&self, name: &str, timeout: Duration) -> Result<(), SkiffError> {
        let supplier = self
            .get(name)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{name}'")))?;
        let provider: Arc<dyn ModelProvider> = if supplier.is_local {
            Arc::new(LocalProvider::new(supplier.base_url.clone(), timeout))
        } else {
            Arc::new(OpenAiCompatProvider::new(
                supplier.name.clone(),
                supplier.base_url.clone(),
                supplier.api_key.clone(),
                timeout,
            ))
        };
        provider.list_models().await?;
        Ok(())
    }

    pub fn models(&self, supplier: &str) -> Result<Vec<SupplierModel>, SkiffError> {
        let supplier = self
            .get(supplier)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{supplier}'")))?;
        Ok(supplier.models)
    }

    pub fn add_model(&self, supplier: &str, model: SupplierModel) -> Result<(), SkiffError> {
        let mut s = self
            .get(supplier)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{supplier}'")))?;
        if s.models.iter().any(|m| m.name == model.name) {
            return Err(SkiffError::Conflict(format!(
                "model '{}' already exists on '{}'",
                model.name, supplier
            )));
        }
        s.models.push(model);
        self.persist(&s)
    }

    pub fn remove_model(&self, supplier: &str, model: &str) -> Result<(), SkiffError> {
        let mut s = self
            .get(supplier)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{supplier}'")))?;
        let before = s.models.len();
        s.models.retain(|m| m.name != model);
        if s.models.len() == before {
            return Err(SkiffError::not_found(format!("model '{model}'")));
        }
        self.persist(&s)
    }

    pub fn set_model_status(
        &self,
        supplier: &str,
        model: &str,
        enabled: bool,
    ) -> Result<(), SkiffError> {
        self.update_model(supplier, model, |m| m.enabled = enabled)
    }

    pub fn set_model_title(
        &self,
        supplier: &str,
        model: &str,
        title: &str,
    ) -> Result<(), SkiffError> {
        let title = title.to_string();
        self.update_model(supplier, model, move |m| m.title = title.clone())
    }

    fn update_model(
        &self,
        supplier: &str,
        model: &str,
        f: impl Fn(&mut SupplierModel),
    ) -> Result<(), SkiffError> {
        let mut s = self
            .get(supplier)?
            .ok_or_else(|| SkiffError::not_found(format!("supplier '{supplier}'")))?;
        let m = s
            .models
            .iter_mut()
            .find(|m| m.name == model)
            .ok_or_else(|| SkiffError::not_found(format!("model '{model}'")))?;
        f(m);
        self.persist(&s)
    }

    /// Flat list of embedding-capable models across enabled suppliers.
    pub fn list_embedding_models(&self) -> Result<Vec<EmbeddingModelRef>, SkiffError> {
        let mut out = Vec::new();
        for supplier in self.list()? {
            if !supplier.enabled {
                continue;
            }
            for model in &supplier.models {
                if model.enabled && model.has_capability(Capability::Embedding) {
                    out.push(EmbeddingModelRef {
                        supplier: supplier.name.clone(),
                        model: model.name.clone(),
                        title: if model.title.is_empty() {
                            model.name.clone()
                        } else {
                            model.title.clone()
                        },
                    });
                }
            }
        }
        Ok(out)
    }

    /// Create or refresh the local supplier record at startup. Its base URL
    /// always tracks the managed runtime.
    pub fn ensure_local(&self, base_url: &str) -> Result<(), SkiffError> {
        let supplier = match self.get(LOCAL_SUPPLIER)? {
            Some(mut s) => {
                s.base_url = base_url.to_string();
                s.is_local = true;
                s
            }
            None => Supplier {
                name: LOCAL_SUPPLIER.into(),
                title: "Local models".into(),
                base_url: base_url.to_string(),
                api_key: String::new(),
                enabled: true,
                is_local: true,
                models: Vec::new(),
            },
        };
        self.persist(&supplier)
    }

    /// Mirror the installed runtime artifacts into the local supplier's
    /// model list. Called by the model manager on install/remove.
    pub fn sync_local_models(&self, models: Vec<SupplierModel>) -> Result<(), SkiffError> {
        let mut s = self
            .get(LOCAL_SUPPLIER)?
            .ok_or_else(|| SkiffError::not_found("local supplier"))?;
        s.models = models;
        self.persist(&s)
    }
}
