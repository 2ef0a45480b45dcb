// src/store/mod.rs — Atomic JSON object store (single writer per file)
//
// All persistence goes through this store. Writes are temp-file + rename
// in the same directory, so readers observe either the pre- or post-write
// snapshot, never a torn file. Corrupt or empty files read as absent, which
// lets startup tolerate partial writes from a prior crash.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::infra::errors::SkiffError;

pub struct ObjectStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path under the root, rejecting traversal.
    fn resolve(&self, rel: &str) -> Result<PathBuf, SkiffError> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute()
            || rel_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SkiffError::InvalidRequest(format!(
                "path escapes data root: {rel}"
            )));
        }
        Ok(self.root.join(rel_path))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read a JSON document. Missing, empty, or corrupt files are `None`.
    pub fn read<T: DeserializeOwned>(&self, rel: &str) -> Result<Option<T>, SkiffError> {
        let path = self.resolve(rel)?;
        let content = match std::fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.is_empty() {
            return Ok(None);
        }
        match serde_json::from_slice(&content) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!("corrupt document at {}: {}", rel, e);
                Ok(None)
            }
        }
    }

    /// Write a JSON document atomically (temp file + rename).
    pub fn write<T: Serialize>(&self, rel: &str, value: &T) -> Result<(), SkiffError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| SkiffError::Internal(anyhow::anyhow!("serialize {rel}: {e}")))?;
        self.write_raw(rel, &bytes)
    }

    /// Write raw bytes atomically. Used for vector file compaction.
    pub fn write_raw(&self, rel: &str, bytes: &[u8]) -> Result<(), SkiffError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let tmp = path.with_extension(format!("tmp.{}", crate::util::random_alnum(8)));
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Append a line to a file. Not atomic across lines, but the readers of
    /// append-only files snapshot the content they can parse.
    pub fn append_line(&self, rel: &str, line: &str) -> Result<(), SkiffError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(())
    }

    /// Read a file as text. Missing files are `None`.
    pub fn read_text(&self, rel: &str) -> Result<Option<String>, SkiffError> {
        let path = self.resolve(rel)?;
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List entry names directly under a directory. Missing dirs are empty.
    pub fn list(&self, rel: &str) -> Result<Vec<String>, SkiffError> {
        let path = self.resolve(rel)?;
        let entries = match std::fs::read_dir(&path) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                // Leftover temp files from interrupted writes are not documents.
                if !name.contains(".tmp.") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.resolve(rel).map(|p| p.exists()).unwrap_or(false)
    }

    /// Remove a single file. Missing files are fine.
    pub fn remove(&self, rel: &str) -> Result<(), SkiffError> {
        let path = self.resolve(rel)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a directory tree. Missing trees are fine.
    pub fn rmtree(&self, rel: &str) -> Result<(), SkiffError> {
        let path = self.resolve(rel)?;
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u32,
        s: String,
    }

    fn test_store() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_round_trip() {
        let (_dir, store) = test_store();
        let doc = Doc {
            n: 7,
            s: "hi".into(),
        };
        store.write("a/b.json", &doc).unwrap();
        assert_eq!(store.read::<Doc>("a/b.json").unwrap(), Some(doc));
    }

    #[test]
    fn test_missing_reads_none() {
        let (_dir, store) = test_store();
        assert_eq!(store.read::<Doc>("nope.json").unwrap(), None);
    }

    #[test]
    fn test_corrupt_reads_none() {
        let (dir, store) = test_store();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        assert_eq!(store.read::<Doc>("bad.json").unwrap(), None);
    }

    #[test]
    fn test_empty_reads_none() {
        let (dir, store) = test_store();
        std::fs::write(dir.path().join("empty.json"), b"").unwrap();
        assert_eq!(store.read::<Doc>("empty.json").unwrap(), None);
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, store) = test_store();
        assert!(store.read::<Doc>("../escape.json").is_err());
        assert!(store
            .write("a/../../escape.json", &Doc { n: 0, s: "".into() })
            .is_err());
    }

    #[test]
    fn test_list_skips_temp_files() {
        let (dir, store) = test_store();
        store.write("d/one.json", &1u32).unwrap();
        std::fs::write(dir.path().join("d/x.tmp.abc"), b"junk").unwrap();
        assert_eq!(store.list("d").unwrap(), vec!["one.json".to_string()]);
    }

    #[test]
    fn test_rmtree_missing_ok() {
        let (_dir, store) = test_store();
        store.rmtree("ghost").unwrap();
    }

    #[test]
    fn test_append_and_read_text() {
        let (_dir, store) = test_store();
        store.append_line("v.bin", "line1").unwrap();
        store.append_line("v.bin", "line2").unwrap();
        assert_eq!(store.read_text("v.bin").unwrap().unwrap(), "line1\nline2\n");
    }
}
