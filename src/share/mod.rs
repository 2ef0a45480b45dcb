// src/share/mod.rs — Conversation sharing metadata (peripheral)

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chat::SessionStore;
use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::store::ObjectStore;
use crate::util;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: String,
    pub context_id: String,
    pub title: String,
    pub create_time: i64,
}

pub struct ShareStore {
    store: Arc<ObjectStore>,
    sessions: Arc<SessionStore>,
}

impl ShareStore {
    pub fn new(store: Arc<ObjectStore>, sessions: Arc<SessionStore>) -> Self {
        Self { store, sessions }
    }

    pub fn create(&self, context_id: &str, title: Option<String>) -> Result<ShareRecord, SkiffError> {
        let conversation = self.sessions.require(context_id)?;
        let record = ShareRecord {
            id: util::new_id(),
            context_id: context_id.to_string(),
            title: title.unwrap_or(conversation.title),
            create_time: util::now_secs(),
        };
        self.store.write(&paths::share_file(&record.id), &record)?;
        Ok(record)
    }

    pub fn get(&self, share_id: &str) -> Result<ShareRecord, SkiffError> {
        self.store
            .read(&paths::share_file(share_id))?
            .ok_or_else(|| SkiffError::not_found(format!("share '{share_id}'")))
    }

    pub fn list(&self) -> Result<Vec<ShareRecord>, SkiffError> {
        let mut out = Vec::new();
        for file in self.store.list("share")? {
            let Some(id) = file.strip_suffix(".json") else {
                continue;
            };
            if let Some(r) = self.store.read::<ShareRecord>(&paths::share_file(id))? {
                out.push(r);
            }
        }
        out.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn remove(&self, share_id: &str) -> Result<(), SkiffError> {
        self.get(share_id)?;
        self.store.remove(&paths::share_file(share_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Arc<SessionStore>, ShareStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let sessions = Arc::new(SessionStore::new(store.clone()));
        let shares = ShareStore::new(store, sessions.clone());
        (dir, sessions, shares)
    }

    #[test]
    fn test_share_round_trip() {
        let (_d, sessions, shares) = setup();
        let c = sessions.create("t", "m", "", "s").unwrap();
        let share = shares.create(&c.id, None).unwrap();
        assert_eq!(share.title, "t");
        assert_eq!(shares.list().unwrap().len(), 1);
        shares.remove(&share.id).unwrap();
        assert!(shares.list().unwrap().is_empty());
    }

    #[test]
    fn test_share_unknown_conversation() {
        let (_d, _sessions, shares) = setup();
        assert!(matches!(
            shares.create("ghost", None),
            Err(SkiffError::NotFound { .. })
        ));
    }
}
