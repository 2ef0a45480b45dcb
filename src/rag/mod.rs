// src/rag/mod.rs — RAG knowledge pipeline

pub mod chunker;
pub mod index;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;

use crate::infra::config::RagConfig;
use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::provider::ProviderFactory;
use crate::store::ObjectStore;
use crate::supplier::{Capability, SupplierRegistry};
use crate::util;
use index::{ChunkRecord, ScoredChunk, VectorIndex};

/// Knowledge-base manifest, persisted at rag/<name>/manifest.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagManifest {
    #[serde(rename = "ragName")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Embedding model reference: all chunks in the base share it.
    #[serde(rename = "supplierName")]
    pub supplier: String,
    pub model: String,
    /// Fixed by the first embedded chunk.
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub next_chunk_id: u64,
    pub create_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Parsing,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub id: String,
    pub filename: String,
    pub source_path: String,
    pub status: DocStatus,
    #[serde(default)]
    pub chunk_count: usize,
    /// First characters of the parsed text.
    #[serde(rename = "abstract", default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub upload_time: i64,
}

/// Fields accepted by create_rag / modify_rag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagUpsert {
    #[serde(rename = "ragName", default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "supplierName", default)]
    pub supplier: String,
    #[serde(default)]
    pub model: String,
}

pub struct RagStore {
    store: Arc<ObjectStore>,
    registry: Arc<SupplierRegistry>,
    providers: Arc<dyn ProviderFactory>,
    indexes: Mutex<HashMap<String, Arc<RwLock<VectorIndex>>>>,
    /// Wakes the parse worker when a document is uploaded.
    pub wake: Arc<Notify>,
    cfg: RagConfig,
}

impl RagStore {
    pub fn new(
        store: Arc<ObjectStore>,
        registry: Arc<SupplierRegistry>,
        providers: Arc<dyn ProviderFactory>,
        cfg: RagConfig,
    ) -> Self {
        Self {
            store,
            registry,
            providers,
            indexes: Mutex::new(HashMap::new()),
            wake: Arc::new(Notify::new()),
            cfg,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    fn index_for(&self, base: &str) -> Result<Arc<RwLock<VectorIndex>>, SkiffError> {
        let mut indexes = self.indexes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(idx) = indexes.get(base) {
            return Ok(idx.clone());
        }
        let idx = Arc::new(RwLock::new(VectorIndex::load(&self.store, base)?));
        indexes.insert(base.to_string(), idx.clone());
        Ok(idx)
    }

    pub fn manifest(&self, base: &str) -> Result<RagManifest, SkiffError> {
        self.store
            .read::<RagManifest>(&paths::rag_manifest(base))?
            .ok_or_else(|| SkiffError::not_found(format!("knowledge base '{base}'")))
    }

    fn write_manifest(&self, manifest: &RagManifest) -> Result<(), SkiffError> {
        self.store
            .write(&paths::rag_manifest(&manifest.name), manifest)
    }

    fn validate_embedding_model(&self, supplier: &str, model: &str) -> Result<(), SkiffError> {
        let s = self
            .registry
            .get(supplier)?
            .ok_or_else(|| SkiffError::InvalidRequest(format!("unknown supplier '{supplier}'")))?;
        let m = s.models.iter().find(|m| m.name == model).ok_or_else(|| {
            SkiffError::InvalidRequest(format!("unknown model '{model}' on '{supplier}'"))
        })?;
        if !m.has_capability(Capability::Embedding) {
            return Err(SkiffError::InvalidRequest(format!(
                "model '{model}' has no embedding capability"
            )));
        }
        Ok(())
    }

    pub fn create(&self, req: RagUpsert) -> Result<RagManifest, SkiffError> {
        let name = req.name.trim();
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(SkiffError::InvalidRequest("invalid knowledge base name".into()));
        }
        if self.store.exists(&paths::rag_manifest(name)) {
            return Err(SkiffError::Conflict(format!(
                "knowledge base '{name}' already exists"
            )));
        }
        self.validate_embedding_model(&req.supplier, &req.model)?;

        let manifest = RagManifest {
            name: name.to_string(),
            description: req.description,
            supplier: req.supplier,
            model: req.model,
            dimension: None,
            next_chunk_id: 1,
            create_time: util::now_secs(),
        };
        self.write_manifest(&manifest)?;
        Ok(manifest)
    }

    /// Update description; the embedding model may only change while the
    /// base has no documents (anything else would need full re-embedding).
    pub fn modify(&self, req: RagUpsert) -> Result<RagManifest, SkiffError> {
        let mut manifest = self.manifest(&req.name)?;
        manifest.description = req.description;

        let model_changed = (!req.supplier.is_empty() && req.supplier != manifest.supplier)
            || (!req.model.is_empty() && req.model != manifest.model);
        if model_changed {
            if !self.list_docs(&req.name)?.is_empty() {
                return Err(SkiffError::Conflict(
                    "cannot change the embedding model of a base with documents".into(),
                ));
            }
            self.validate_embedding_model(&req.supplier, &req.model)?;
            manifest.supplier = req.supplier;
            manifest.model = req.model;
            manifest.dimension = None;
        }
        self.write_manifest(&manifest)?;
        Ok(manifest)
    }

    pub fn remove(&self, base: &str) -> Result<(), SkiffError> {
        // Manifest lookup doubles as the existence check.
        self.manifest(base)?;
        self.store.rmtree(&paths::rag_dir(base))?;
        self.indexes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(base);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<RagManifest>, SkiffError> {
        let mut out = Vec::new();
        for name in self.store.list("rag")? {
            if let Some(m) = self.store.read::<RagManifest>(&paths::rag_manifest(&name))? {
                out.push(m);
            }
        }
        out.sort_by(|a, b| a.create_time.cmp(&b.create_time).then(a.name.cmp(&b.name)));
        Ok(out)
    }

    /// Register uploads as pending documents and wake the worker. The
    /// pending records are visible to `list_docs` immediately.
    pub fn upload_docs(&self, base: &str, file_paths: &[String]) -> Result<Vec<DocMeta>, SkiffError> {
        self.manifest(base)?;
        let mut metas = Vec::new();
        for path in file_paths {
            let filename = PathBuf::from(path)
                .file_name()
                .and_then(|n| n.to_str().map(|s| s.to_string()))
                .unwrap_or_else(|| path.clone());
            let meta = DocMeta {
                id: util::new_id(),
                filename,
                source_path: path.clone(),
                status: DocStatus::Pending,
                chunk_count: 0,
                summary: String::new(),
                error: None,
                upload_time: util::now_secs(),
            };
            self.store.write(&paths::rag_doc_meta(base, &meta.id), &meta)?;
            metas.push(meta);
        }
        self.wake.notify_one();
        Ok(metas)
    }

    pub fn list_docs(&self, base: &str) -> Result<Vec<DocMeta>, SkiffError> {
        self.manifest(base)?;
        let mut docs = Vec::new();
        for file in self.store.list(&paths::rag_docs_dir(base))? {
            let Some(id) = file.strip_suffix(".meta") else {
                continue;
            };
            if let Some(meta) = self.store.read::<DocMeta>(&paths::rag_doc_meta(base, id))? {
                docs.push(meta);
            }
        }
        docs.sort_by(|a, b| a.upload_time.cmp(&b.upload_time).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    pub fn get_doc(&self, base: &str, doc_id: &str) -> Result<DocMeta, SkiffError> {
        self.store
            .read::<DocMeta>(&paths::rag_doc_meta(base, doc_id))?
            .ok_or_else(|| SkiffError::not_found(format!("document '{doc_id}'")))
    }

    /// Parsed text of a document (joined chunks); falls back to the raw
    /// source file while parsing hasn't finished.
    pub fn doc_content(&self, base: &str, doc_id: &str) -> Result<String, SkiffError> {
        let meta = self.get_doc(base, doc_id)?;
        if meta.status == DocStatus::Parsed {
            let idx = self.index_for(base)?;
            let guard = idx.read().unwrap_or_else(|e| e.into_inner());
            if let Some(text) = guard.doc_text(doc_id) {
                return Ok(text);
            }
        }
        Ok(std::fs::read_to_string(&meta.source_path)?)
    }

    pub fn remove_docs(&self, base: &str, doc_ids: &[String]) -> Result<(), SkiffError> {
        self.manifest(base)?;
        let idx = self.index_for(base)?;
        for doc_id in doc_ids {
            self.store.remove(&paths::rag_doc_meta(base, doc_id))?;
            let mut guard = idx.write().unwrap_or_else(|e| e.into_inner());
            guard.remove_document(&self.store, base, doc_id)?;
        }
        Ok(())
    }

    /// Startup normalisation: reload every base's vector file, drop chunks
    /// of documents that no longer exist, and compact. Idempotent.
    pub fn switch_to_cosine_index(&self) -> Result<(), SkiffError> {
        for manifest in self.list()? {
            let keep: HashSet<String> = self
                .list_docs(&manifest.name)?
                .into_iter()
                .map(|d| d.id)
                .collect();
            let had_vectors = self.store.exists(&paths::rag_vectors(&manifest.name));
            let mut idx = VectorIndex::load(&self.store, &manifest.name)?;
            let dropped = idx.retain_docs(&keep);
            // Rewriting also compacts away malformed lines skipped by load.
            if had_vectors || dropped {
                idx.rewrite(&self.store, &manifest.name)?;
            }
            self.indexes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(manifest.name.clone(), Arc::new(RwLock::new(idx)));
        }
        Ok(())
    }

    // ─── Worker side ────────────────────────────────────────────

    /// Oldest pending document across all bases, if any.
    pub fn next_pending(&self) -> Result<Option<(String, DocMeta)>, SkiffError> {
        let mut oldest: Option<(String, DocMeta)> = None;
        for manifest in self.list()? {
            for doc in self.list_docs(&manifest.name)? {
                if doc.status != DocStatus::Pending {
                    continue;
                }
                let replace = match &oldest {
                    Some((_, cur)) => doc.upload_time < cur.upload_time,
                    None => true,
                };
                if replace {
                    oldest = Some((manifest.name.clone(), doc));
                }
            }
        }
        Ok(oldest)
    }

    /// Parse, chunk, embed and persist one document. Any error marks the
    /// document failed and is not propagated: the worker moves on.
    pub async fn process_document(&self, base: &str, mut meta: DocMeta) {
        meta.status = DocStatus::Parsing;
        meta.error = None;
        if let Err(e) = self.store.write(&paths::rag_doc_meta(base, &meta.id), &meta) {
            tracing::warn!("cannot mark '{}' parsing: {}", meta.id, e);
            return;
        }

        match self.ingest(base, &meta).await {
            Ok((chunk_count, summary)) => {
                meta.status = DocStatus::Parsed;
                meta.chunk_count = chunk_count;
                meta.summary = summary;
            }
            Err(e) => {
                tracing::warn!("parse failed for '{}': {}", meta.filename, e);
                meta.status = DocStatus::Failed;
                meta.error = Some(e.to_string());
            }
        }
        if let Err(e) = self.store.write(&paths::rag_doc_meta(base, &meta.id), &meta) {
            tracing::warn!("cannot finalise '{}': {}", meta.id, e);
        }
    }

    async fn ingest(&self, base: &str, meta: &DocMeta) -> Result<(usize, String), SkiffError> {
        let manifest = self.manifest(base)?;
        let chunks = chunker::chunk_file(PathBuf::from(&meta.source_path).as_path(), self.cfg.chunk_chars)?;
        if chunks.is_empty() {
            return Err(SkiffError::InvalidRequest("document has no text".into()));
        }

        let supplier = self.registry.get(&manifest.supplier)?.ok_or_else(|| {
            SkiffError::InvalidRequest(format!("embedding supplier '{}' is gone", manifest.supplier))
        })?;
        let provider = self.providers.provider_for(&supplier);

        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let mut embedded = provider
                .embed(&manifest.model, std::slice::from_ref(&chunk.text))
                .await?;
            let vector = embedded.pop().ok_or_else(|| {
                SkiffError::upstream(&manifest.supplier, "empty embedding batch")
            })?;
            vectors.push(vector);
        }

        // All chunks in a base share the embedding dimension.
        let mut manifest = self.manifest(base)?;
        let dim = manifest.dimension.unwrap_or(vectors[0].len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(SkiffError::InvalidRequest(format!(
                "embedding dimension {} does not match base dimension {dim}",
                bad.len()
            )));
        }

        let summary: String = {
            let full: String = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
            full.chars().take(self.cfg.abstract_chars).collect()
        };

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, chunk)| ChunkRecord {
                chunk_id: manifest.next_chunk_id + ordinal as u64,
                doc_id: meta.id.clone(),
                ordinal,
                offset: chunk.offset,
                text: chunk.text,
                vector: vectors[ordinal].clone(),
            })
            .collect();
        let count = records.len();
        manifest.next_chunk_id += count as u64;
        manifest.dimension = Some(dim);

        let idx = self.index_for(base)?;
        {
            let mut guard = idx.write().unwrap_or_else(|e| e.into_inner());
            guard.append(&self.store, base, records)?;
        }
        self.write_manifest(&manifest)?;

        Ok((count, summary))
    }

    // ─── Retrieval ──────────────────────────────────────────────

    /// Retrieve top snippets for a query across the given bases: embed the
    /// query once per distinct embedding model, take per-base top-k, merge,
    /// re-sort, cap globally.
    pub async fn retrieve(
        &self,
        rag_list: &[String],
        query: &str,
    ) -> Result<Vec<ScoredChunk>, SkiffError> {
        let mut query_vectors: HashMap<(String, String), Vec<f32>> = HashMap::new();
        let mut all = Vec::new();

        for base in rag_list {
            let manifest = self.manifest(base)?;
            let key = (manifest.supplier.clone(), manifest.model.clone());

            if !query_vectors.contains_key(&key) {
                let supplier = self.registry.get(&manifest.supplier)?.ok_or_else(|| {
                    SkiffError::InvalidRequest(format!(
                        "embedding supplier '{}' is gone",
                        manifest.supplier
                    ))
                })?;
                let provider = self.providers.provider_for(&supplier);
                let mut embedded = provider
                    .embed(&manifest.model, std::slice::from_ref(&query.to_string()))
                    .await?;
                let vector = embedded
                    .pop()
                    .ok_or_else(|| SkiffError::upstream(&manifest.supplier, "empty embedding"))?;
                query_vectors.insert(key.clone(), vector);
            }
            let qvec = &query_vectors[&key];

            let enabled: HashSet<String> = self
                .list_docs(base)?
                .into_iter()
                .filter(|d| d.status == DocStatus::Parsed)
                .map(|d| d.id)
                .collect();

            let idx = self.index_for(base)?;
            let guard = idx.read().unwrap_or_else(|e| e.into_inner());
            all.extend(guard.query(qvec, self.cfg.per_base_k, &enabled));
        }

        all.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        all.truncate(self.cfg.global_k);
        Ok(all)
    }
}

/// Format retrieved snippets into the prompt preamble prepended to the
/// user's message. The only contract is that cited snippets are visible
/// to the model.
pub fn build_preamble(hits: &[ScoredChunk]) -> String {
    let mut out = String::from("Reference material:\n");
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("[{}] {}\n", i + 1, hit.text));
    }
    out.push_str("\nAnswer using the reference material where relevant.\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_numbers_snippets() {
        let hits = vec![
            ScoredChunk {
                chunk_id: 1,
                doc_id: "d".into(),
                text: "alpha".into(),
                score: 0.9,
            },
            ScoredChunk {
                chunk_id: 2,
                doc_id: "d".into(),
                text: "beta".into(),
                score: 0.5,
            },
        ];
        let p = build_preamble(&hits);
        assert!(p.contains("[1] alpha"));
        assert!(p.contains("[2] beta"));
    }
}
