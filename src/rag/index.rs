// src/rag/index.rs — Per-base cosine vector index
//
// Flat in-memory array persisted as an append-only JSON-lines file
// (vectors.bin). The parse worker is the only writer; chat retrieval
// reads a snapshot under the read lock.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::store::ObjectStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: u64,
    pub doc_id: String,
    pub ordinal: usize,
    /// Byte offset of the chunk in the parsed source text.
    pub offset: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: u64,
    pub doc_id: String,
    pub text: String,
    pub score: f32,
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<ChunkRecord>,
}

impl VectorIndex {
    /// Replay the vector file. Malformed lines (partial appends from a
    /// crash) are dropped, not propagated.
    pub fn load(store: &ObjectStore, base: &str) -> Result<Self, SkiffError> {
        let mut entries = Vec::new();
        if let Some(content) = store.read_text(&paths::rag_vectors(base))? {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ChunkRecord>(line) {
                    Ok(rec) => entries.push(rec),
                    Err(e) => tracing::warn!("dropping malformed chunk line in '{}': {}", base, e),
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn doc_chunk_count(&self, doc_id: &str) -> usize {
        self.entries.iter().filter(|e| e.doc_id == doc_id).count()
    }

    pub fn doc_text(&self, doc_id: &str) -> Option<String> {
        let mut chunks: Vec<&ChunkRecord> =
            self.entries.iter().filter(|e| e.doc_id == doc_id).collect();
        if chunks.is_empty() {
            return None;
        }
        chunks.sort_by_key(|c| c.ordinal);
        Some(
            chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    /// Append records to memory and the persisted file.
    pub fn append(
        &mut self,
        store: &ObjectStore,
        base: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<(), SkiffError> {
        let path = paths::rag_vectors(base);
        for rec in records {
            let line = serde_json::to_string(&rec)
                .map_err(|e| SkiffError::Internal(anyhow::anyhow!("encode chunk: {e}")))?;
            store.append_line(&path, &line)?;
            self.entries.push(rec);
        }
        Ok(())
    }

    /// Drop a document's chunks from memory and compact the file.
    pub fn remove_document(
        &mut self,
        store: &ObjectStore,
        base: &str,
        doc_id: &str,
    ) -> Result<(), SkiffError> {
        self.entries.retain(|e| e.doc_id != doc_id);
        self.rewrite(store, base)
    }

    /// Rewrite the persisted file from the in-memory entries. Used by
    /// document removal and the startup rebuild.
    pub fn rewrite(&self, store: &ObjectStore, base: &str) -> Result<(), SkiffError> {
        let mut out = String::new();
        for rec in &self.entries {
            let line = serde_json::to_string(rec)
                .map_err(|e| SkiffError::Internal(anyhow::anyhow!("encode chunk: {e}")))?;
            out.push_str(&line);
            out.push('\n');
        }
        store.write_raw(&paths::rag_vectors(base), out.as_bytes())
    }

    /// Retain only chunks of the given documents. Returns true when
    /// anything was dropped.
    pub fn retain_docs(&mut self, keep: &HashSet<String>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| keep.contains(&e.doc_id));
        self.entries.len() != before
    }

    /// Cosine top-k across chunks of enabled documents. Descending score,
    /// ties broken by lower chunk_id.
    pub fn query(
        &self,
        query_vector: &[f32],
        k: usize,
        enabled_docs: &HashSet<String>,
    ) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .filter(|e| enabled_docs.contains(&e.doc_id))
            .map(|e| ScoredChunk {
                chunk_id: e.chunk_id,
                doc_id: e.doc_id.clone(),
                text: e.text.clone(),
                score: cosine_similarity(query_vector, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn rec(chunk_id: u64, doc: &str, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            doc_id: doc.into(),
            ordinal: chunk_id as usize,
            offset: 0,
            text: format!("chunk {chunk_id}"),
            vector,
        }
    }

    fn all_docs(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_query_ranks_by_cosine() {
        let mut idx = VectorIndex::default();
        idx.entries = vec![
            rec(1, "d1", vec![0.0, 1.0]),
            rec(2, "d1", vec![1.0, 0.0]),
            rec(3, "d1", vec![0.7, 0.7]),
        ];
        let hits = idx.query(&[1.0, 0.0], 2, &all_docs(&["d1"]));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 2);
        assert_eq!(hits[1].chunk_id, 3);
    }

    #[test]
    fn test_query_tie_breaks_by_lower_chunk_id() {
        let mut idx = VectorIndex::default();
        idx.entries = vec![
            rec(9, "d1", vec![1.0, 0.0]),
            rec(3, "d1", vec![2.0, 0.0]), // same direction, same cosine
        ];
        let hits = idx.query(&[1.0, 0.0], 2, &all_docs(&["d1"]));
        assert_eq!(hits[0].chunk_id, 3);
        assert_eq!(hits[1].chunk_id, 9);
    }

    #[test]
    fn test_query_skips_disabled_docs() {
        let mut idx = VectorIndex::default();
        idx.entries = vec![rec(1, "d1", vec![1.0, 0.0]), rec(2, "d2", vec![1.0, 0.0])];
        let hits = idx.query(&[1.0, 0.0], 10, &all_docs(&["d2"]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "d2");
    }

    #[test]
    fn test_query_deterministic() {
        let mut idx = VectorIndex::default();
        idx.entries = (0..20)
            .map(|i| rec(i, "d1", vec![(i % 5) as f32, 1.0]))
            .collect();
        let docs = all_docs(&["d1"]);
        let a: Vec<u64> = idx.query(&[0.3, 0.9], 5, &docs).iter().map(|h| h.chunk_id).collect();
        let b: Vec<u64> = idx.query(&[0.3, 0.9], 5, &docs).iter().map(|h| h.chunk_id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_persistence_round_trip_and_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));

        let mut idx = VectorIndex::default();
        idx.append(
            &store,
            "kb",
            vec![rec(1, "d1", vec![1.0, 0.0]), rec(2, "d2", vec![0.0, 1.0])],
        )
        .unwrap();

        let loaded = VectorIndex::load(&store, "kb").unwrap();
        assert_eq!(loaded.len(), 2);

        let mut loaded = loaded;
        loaded.remove_document(&store, "kb", "d1").unwrap();
        let reloaded = VectorIndex::load(&store, "kb").unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.doc_chunk_count("d2"), 1);
        assert_eq!(reloaded.doc_chunk_count("d1"), 0);
    }

    #[test]
    fn test_load_drops_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let mut idx = VectorIndex::default();
        idx.append(&store, "kb", vec![rec(1, "d1", vec![1.0])]).unwrap();
        store.append_line("rag/kb/vectors.bin", "{truncated").unwrap();

        let loaded = VectorIndex::load(&store, "kb").unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
