// src/infra/paths.rs — On-disk layout under the data root
//
// Every persisted document lives under $DATA_ROOT, addressed by the
// relative paths built here. The object store owns the layout; nothing
// else touches the filesystem directly.

use std::path::PathBuf;

/// Default data root when DATA_ROOT is not set: ~/.skiff
pub fn default_data_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skiff")
}

pub fn conversation_dir(context_id: &str) -> String {
    format!("context/{context_id}")
}

pub fn conversation_config(context_id: &str) -> String {
    format!("context/{context_id}/config.json")
}

pub fn conversation_history(context_id: &str) -> String {
    format!("context/{context_id}/history.json")
}

pub fn supplier_file(name: &str) -> String {
    format!("suppliers/{name}.json")
}

pub fn rag_dir(base: &str) -> String {
    format!("rag/{base}")
}

pub fn rag_manifest(base: &str) -> String {
    format!("rag/{base}/manifest.json")
}

pub fn rag_vectors(base: &str) -> String {
    format!("rag/{base}/vectors.bin")
}

pub fn rag_doc_meta(base: &str, doc_id: &str) -> String {
    format!("rag/{base}/docs/{doc_id}.meta")
}

pub fn rag_docs_dir(base: &str) -> String {
    format!("rag/{base}/docs")
}

pub fn installed_models() -> String {
    "models/installed.json".into()
}

pub fn share_file(share_id: &str) -> String {
    format!("share/{share_id}.json")
}

pub fn settings_file() -> String {
    "settings.json".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_contract() {
        assert_eq!(conversation_config("c1"), "context/c1/config.json");
        assert_eq!(conversation_history("c1"), "context/c1/history.json");
        assert_eq!(rag_manifest("kb"), "rag/kb/manifest.json");
        assert_eq!(rag_vectors("kb"), "rag/kb/vectors.bin");
        assert_eq!(rag_doc_meta("kb", "d1"), "rag/kb/docs/d1.meta");
        assert_eq!(supplier_file("local"), "suppliers/local.json");
        assert_eq!(installed_models(), "models/installed.json");
    }
}
