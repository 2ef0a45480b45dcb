// src/manager/mod.rs — Local model manager
//
// Installs are modelled as jobs: request returns immediately, the UI
// polls progress. Installed artifacts mirror into the local supplier's
// model catalog.

pub mod jobs;
pub mod runtime;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::infra::config::ManagerConfig;
use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::store::ObjectStore;
use crate::supplier::{Capability, SupplierModel, SupplierRegistry};
pub use jobs::{InstallJob, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(default)]
    pub parameters: String,
}

impl InstalledModel {
    /// Runtime artifact tag, `name:parameters`.
    pub fn tag(&self) -> String {
        if self.parameters.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.parameters)
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag.split_once(':') {
            Some((name, parameters)) => Self {
                name: name.to_string(),
                parameters: parameters.to_string(),
            },
            None => Self {
                name: tag.to_string(),
                parameters: String::new(),
            },
        }
    }
}

/// Catalog entry for an installable artifact.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleModel {
    pub name: String,
    pub title: String,
    pub parameters: Vec<&'static str>,
    pub capabilities: Vec<Capability>,
}

/// Installable artifacts surfaced to the UI. Kept small on purpose: the
/// runtime can pull anything, this is the curated starter set.
pub fn visible_models() -> Vec<VisibleModel> {
    vec![
        VisibleModel {
            name: "llama3.1".into(),
            title: "Llama 3.1".into(),
            parameters: vec!["8b", "70b"],
            capabilities: vec![Capability::Chat, Capability::Tools],
        },
        VisibleModel {
            name: "qwen2.5".into(),
            title: "Qwen 2.5".into(),
            parameters: vec!["7b", "14b", "32b"],
            capabilities: vec![Capability::Chat, Capability::Tools],
        },
        VisibleModel {
            name: "deepseek-r1".into(),
            title: "DeepSeek R1".into(),
            parameters: vec!["7b", "14b", "32b"],
            capabilities: vec![Capability::Chat],
        },
        VisibleModel {
            name: "llava".into(),
            title: "LLaVA".into(),
            parameters: vec!["7b", "13b"],
            capabilities: vec![Capability::Chat, Capability::Vision],
        },
        VisibleModel {
            name: "nomic-embed-text".into(),
            title: "Nomic Embed".into(),
            parameters: vec!["latest"],
            capabilities: vec![Capability::Embedding],
        },
        VisibleModel {
            name: "bge-m3".into(),
            title: "BGE-M3".into(),
            parameters: vec!["latest"],
            capabilities: vec![Capability::Embedding],
        },
    ]
}

fn model_capabilities(name: &str) -> Vec<Capability> {
    if let Some(v) = visible_models().into_iter().find(|m| m.name == name) {
        return v.capabilities;
    }
    if name.contains("embed") || name.contains("bge") {
        vec![Capability::Embedding]
    } else {
        vec![Capability::Chat]
    }
}

pub struct ModelManager {
    store: Arc<ObjectStore>,
    registry: Arc<SupplierRegistry>,
    client: reqwest::Client,
    jobs: Mutex<HashMap<String, InstallJob>>,
    manager_job: Mutex<Option<InstallJob>>,
    mirror_idx: AtomicUsize,
    cfg: ManagerConfig,
    data_root: PathBuf,
    runtime: Mutex<Option<tokio::process::Child>>,
}

impl ModelManager {
    pub fn new(
        store: Arc<ObjectStore>,
        registry: Arc<SupplierRegistry>,
        cfg: ManagerConfig,
        data_root: PathBuf,
    ) -> Self {
        Self {
            store,
            registry,
            client: reqwest::Client::new(),
            jobs: Mutex::new(HashMap::new()),
            manager_job: Mutex::new(None),
            mirror_idx: AtomicUsize::new(0),
            cfg,
            data_root,
            runtime: Mutex::new(None),
        }
    }

    pub fn runtime_url(&self) -> &str {
        &self.cfg.runtime_url
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.data_root.join(&self.cfg.runtime_dir)
    }

    // ─── Model install ──────────────────────────────────────────

    /// Start (or report) an install job. Non-blocking; a job already done
    /// is returned as-is, which makes the operation idempotent.
    pub fn install_model(self: &Arc<Self>, name: &str, parameters: &str) -> InstallJob {
        let model = InstalledModel {
            name: name.to_string(),
            parameters: parameters.to_string(),
        };
        let key = model.tag();

        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get(&key) {
            if job.status == JobStatus::Done || !job.status.is_terminal() {
                return job.clone();
            }
        }

        let job = InstallJob::queued(name, parameters);
        jobs.insert(key.clone(), job.clone());
        drop(jobs);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_model_install(key).await;
        });
        job
    }

    pub fn model_install_progress(
        &self,
        name: &str,
        parameters: &str,
    ) -> Result<InstallJob, SkiffError> {
        let key = InstalledModel {
            name: name.to_string(),
            parameters: parameters.to_string(),
        }
        .tag();
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .ok_or_else(|| SkiffError::not_found(format!("install job '{key}'")))
    }

    fn update_job(&self, key: &str, status: JobStatus, progress: f32, notice: &str) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(key) {
            job.advance(status, progress, notice);
        }
    }

    /// Drive the runtime's pull endpoint, mapping its NDJSON progress
    /// lines onto the job.
    async fn run_model_install(self: Arc<Self>, key: String) {
        let result = self.pull_from_runtime(&key).await;
        match result {
            Ok(()) => {
                self.update_job(&key, JobStatus::Done, 1.0, "installed");
                if let Err(e) = self.refresh_installed().await {
                    tracing::warn!("installed-model refresh failed: {}", e);
                }
            }
            Err(e) => {
                self.update_job(&key, JobStatus::Failed, 0.0, &e.to_string());
            }
        }
    }

    async fn pull_from_runtime(&self, key: &str) -> Result<(), SkiffError> {
        let response = self
            .client
            .post(format!("{}/api/pull", self.cfg.runtime_url))
            .json(&serde_json::json!({ "name": key, "stream": true }))
            .send()
            .await
            .map_err(|e| SkiffError::upstream("runtime", e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkiffError::upstream("runtime", body));
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = byte_stream.next().await {
            let bytes =
                chunk.map_err(|e| SkiffError::upstream("runtime", format!("pull stream: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer = buffer[pos + 1..].to_string();
                if line.is_empty() {
                    continue;
                }
                let parsed: serde_json::Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(err) = parsed["error"].as_str() {
                    return Err(SkiffError::upstream("runtime", err.to_string()));
                }
                let status = parsed["status"].as_str().unwrap_or("");
                let total = parsed["total"].as_f64().unwrap_or(0.0);
                let completed = parsed["completed"].as_f64().unwrap_or(0.0);
                let fraction = if total > 0.0 {
                    (completed / total) as f32
                } else {
                    0.0
                };
                if status.contains("pulling") || status.contains("downloading") {
                    self.update_job(key, JobStatus::Downloading, fraction, status);
                } else if status.contains("verifying") || status.contains("writing") {
                    self.update_job(key, JobStatus::Installing, fraction.max(0.95), status);
                }
            }
        }
        Ok(())
    }

    /// Remove an installed artifact and drop it from the local supplier.
    pub async fn remove_model(&self, name: &str, parameters: &str) -> Result<(), SkiffError> {
        let model = InstalledModel {
            name: name.to_string(),
            parameters: parameters.to_string(),
        };
        let response = self
            .client
            .delete(format!("{}/api/delete", self.cfg.runtime_url))
            .json(&serde_json::json!({ "name": model.tag() }))
            .send()
            .await
            .map_err(|e| SkiffError::upstream("runtime", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(SkiffError::not_found(format!("model '{}'", model.tag())));
            }
            let body = response.text().await.unwrap_or_default();
            return Err(SkiffError::upstream("runtime", body));
        }

        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&model.tag());
        self.refresh_installed().await
    }

    pub fn list_installed(&self) -> Result<Vec<InstalledModel>, SkiffError> {
        Ok(self
            .store
            .read(&paths::installed_models())?
            .unwrap_or_default())
    }

    /// Re-read the runtime's artifact list, persist it, and mirror it
    /// into the local supplier's model catalog.
    pub async fn refresh_installed(&self) -> Result<(), SkiffError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.cfg.runtime_url))
            .send()
            .await
            .map_err(|e| SkiffError::upstream("runtime", e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SkiffError::upstream("runtime", e.to_string()))?;

        let installed: Vec<InstalledModel> = body["models"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|m| m["name"].as_str())
            .map(InstalledModel::from_tag)
            .collect();

        self.store.write(&paths::installed_models(), &installed)?;

        let supplier_models: Vec<SupplierModel> = installed
            .iter()
            .map(|m| SupplierModel {
                name: m.name.clone(),
                title: m.name.clone(),
                parameters: m.parameters.clone(),
                capabilities: model_capabilities(&m.name),
                enabled: true,
            })
            .collect();
        self.registry.sync_local_models(supplier_models)
    }

    // ─── Runtime manager bootstrap ──────────────────────────────

    pub fn install_manager(self: &Arc<Self>, manager_name: &str) -> InstallJob {
        {
            let guard = self.manager_job.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(job) = guard.as_ref() {
                if job.status == JobStatus::Done || !job.status.is_terminal() {
                    return job.clone();
                }
            }
        }

        let job = InstallJob::queued(manager_name, "");
        *self.manager_job.lock().unwrap_or_else(|e| e.into_inner()) = Some(job.clone());

        let manager = Arc::clone(self);
        let name = manager_name.to_string();
        tokio::spawn(async move {
            manager.run_manager_install(name).await;
        });
        job
    }

    pub fn manager_install_progress(&self) -> Result<InstallJob, SkiffError> {
        self.manager_job
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SkiffError::not_found("runtime manager install job"))
    }

    fn update_manager_job(&self, status: JobStatus, progress: f32, notice: &str) {
        let mut guard = self.manager_job.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = guard.as_mut() {
            job.advance(status, progress, notice);
        }
    }

    async fn run_manager_install(self: Arc<Self>, name: String) {
        match runtime::download_and_unpack(&self, &name).await {
            Ok(()) => {
                self.update_manager_job(JobStatus::Done, 1.0, "runtime installed");
                if let Err(e) = self.start_runtime() {
                    tracing::warn!("runtime start after install failed: {}", e);
                }
            }
            Err(e) => {
                self.update_manager_job(JobStatus::Failed, 0.0, &e.to_string());
            }
        }
    }

    /// Rotate to the next download mirror. Restarts the bootstrap job
    /// when the previous attempt failed.
    pub fn reconnect_model_download(self: &Arc<Self>) -> Option<InstallJob> {
        self.mirror_idx.fetch_add(1, Ordering::Relaxed);
        let restart = {
            let guard = self.manager_job.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .as_ref()
                .filter(|j| j.status == JobStatus::Failed)
                .map(|j| j.model.clone())
        };
        restart.map(|name| {
            *self.manager_job.lock().unwrap_or_else(|e| e.into_inner()) = None;
            self.install_manager(&name)
        })
    }

    pub fn current_mirror(&self) -> String {
        let mirrors = &self.cfg.mirrors;
        if mirrors.is_empty() {
            return String::new();
        }
        mirrors[self.mirror_idx.load(Ordering::Relaxed) % mirrors.len()].clone()
    }

    // ─── Runtime process ────────────────────────────────────────

    pub fn start_runtime(&self) -> Result<bool, SkiffError> {
        runtime::start(self)
    }

    pub async fn shutdown(&self) {
        runtime::shutdown(self).await;
    }

    pub(crate) fn runtime_slot(&self) -> &Mutex<Option<tokio::process::Child>> {
        &self.runtime
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn update_manager_progress(&self, status: JobStatus, progress: f32, notice: &str) {
        self.update_manager_job(status, progress, notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        let m = InstalledModel::from_tag("llama3.1:8b");
        assert_eq!(m.name, "llama3.1");
        assert_eq!(m.parameters, "8b");
        assert_eq!(m.tag(), "llama3.1:8b");

        let bare = InstalledModel::from_tag("nomic-embed-text");
        assert_eq!(bare.parameters, "");
        assert_eq!(bare.tag(), "nomic-embed-text");
    }

    #[test]
    fn test_capabilities_heuristic() {
        assert_eq!(
            model_capabilities("nomic-embed-text"),
            vec![Capability::Embedding]
        );
        assert_eq!(model_capabilities("bge-m3"), vec![Capability::Embedding]);
        assert_eq!(model_capabilities("some-chat-model"), vec![Capability::Chat]);
        assert!(model_capabilities("llava").contains(&Capability::Vision));
    }

    #[test]
    fn test_visible_models_catalog() {
        let catalog = visible_models();
        assert!(!catalog.is_empty());
        assert!(catalog.iter().any(|m| m.capabilities.contains(&Capability::Embedding)));
        for m in &catalog {
            assert!(!m.parameters.is_empty());
        }
    }
}
