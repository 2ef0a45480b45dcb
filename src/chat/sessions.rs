// src/chat/sessions.rs — Conversation store
//
// Each conversation owns a directory under context/ with a config and a
// history document. Historical turns stay readable even after their
// supplier is removed from the registry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::history::{regenerate_cut_index, TurnEntry};
use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::store::ObjectStore;
use crate::util;

pub const TITLE_MAX_CHARS: usize = 18;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "context_id")]
    pub id: String,
    pub title: String,
    pub model: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
    pub create_time: i64,
}

pub struct SessionStore {
    store: Arc<ObjectStore>,
}

impl SessionStore {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        title: &str,
        model: &str,
        parameters: &str,
        supplier_name: &str,
    ) -> Result<Conversation, SkiffError> {
        let conversation = Conversation {
            id: util::new_id(),
            title: util::truncate_chars(title, TITLE_MAX_CHARS),
            model: model.to_string(),
            parameters: parameters.to_string(),
            supplier_name: supplier_name.to_string(),
            create_time: util::now_secs(),
        };
        self.store
            .write(&paths::conversation_config(&conversation.id), &conversation)?;
        self.store
            .write(&paths::conversation_history(&conversation.id), &Vec::<TurnEntry>::new())?;
        Ok(conversation)
    }

    pub fn get(&self, id: &str) -> Result<Option<Conversation>, SkiffError> {
        self.store.read(&paths::conversation_config(id))
    }

    pub fn require(&self, id: &str) -> Result<Conversation, SkiffError> {
        self.get(id)?
            .ok_or_else(|| SkiffError::not_found(format!("conversation '{id}'")))
    }

    pub fn list(&self) -> Result<Vec<Conversation>, SkiffError> {
        let mut out = Vec::new();
        for id in self.store.list("context")? {
            if let Some(c) = self.get(&id)? {
                out.push(c);
            }
        }
        // Newest first, the order the sidebar shows.
        out.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn remove(&self, id: &str) -> Result<(), SkiffError> {
        self.require(id)?;
        self.store.rmtree(&paths::conversation_dir(id))
    }

    pub fn set_title(&self, id: &str, title: &str) -> Result<(), SkiffError> {
        let mut conversation = self.require(id)?;
        conversation.title = util::truncate_chars(title, TITLE_MAX_CHARS);
        self.store
            .write(&paths::conversation_config(id), &conversation)
    }

    pub fn history(&self, id: &str) -> Result<Vec<TurnEntry>, SkiffError> {
        Ok(self
            .store
            .read(&paths::conversation_history(id))?
            .unwrap_or_default())
    }

    /// Last (user, assistant) pair, or empty while the log is empty.
    pub fn last_turn(&self, id: &str) -> Result<Vec<TurnEntry>, SkiffError> {
        let history = self.history(id)?;
        let n = history.len();
        Ok(history.into_iter().skip(n.saturating_sub(2)).collect())
    }

    /// Append a completed turn. The pair lands atomically: a reader sees
    /// the log either without or with both entries.
    pub fn append_pair(
        &self,
        id: &str,
        user: TurnEntry,
        assistant: TurnEntry,
    ) -> Result<(), SkiffError> {
        let mut history = self.history(id)?;
        history.push(user);
        history.push(assistant);
        self.store.write(&paths::conversation_history(id), &history)
    }

    /// Drop the turn containing `entry_id` and everything after it. The
    /// only operation that shortens the log.
    pub fn truncate_for_regenerate(&self, id: &str, entry_id: &str) -> Result<(), SkiffError> {
        let mut history = self.history(id)?;
        let cut = regenerate_cut_index(&history, entry_id)
            .ok_or_else(|| SkiffError::not_found(format!("entry '{entry_id}'")))?;
        history.truncate(cut);
        self.store.write(&paths::conversation_history(id), &history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::EntryRole;

    fn test_sessions() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        (dir, SessionStore::new(store))
    }

    #[test]
    fn test_create_truncates_title() {
        let (_d, sessions) = test_sessions();
        let c = sessions
            .create("a very long title that exceeds the cap", "m", "7b", "local")
            .unwrap();
        assert_eq!(c.title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_get_info_round_trip() {
        let (_d, sessions) = test_sessions();
        let created = sessions.create("hello", "m", "", "s1").unwrap();
        let loaded = sessions.require(&created.id).unwrap();
        assert_eq!(loaded.title, "hello");
        assert_eq!(loaded.model, "m");
        assert_eq!(loaded.supplier_name, "s1");
    }

    #[test]
    fn test_append_keeps_parity() {
        let (_d, sessions) = test_sessions();
        let c = sessions.create("t", "m", "", "s").unwrap();
        sessions
            .append_pair(&c.id, TurnEntry::user("hi"), TurnEntry::assistant("hello"))
            .unwrap();
        sessions
            .append_pair(&c.id, TurnEntry::user("more"), TurnEntry::assistant("sure"))
            .unwrap();

        let history = sessions.history(&c.id).unwrap();
        assert_eq!(history.len() % 2, 0);
        for (i, entry) in history.iter().enumerate() {
            let expected = if i % 2 == 0 {
                EntryRole::User
            } else {
                EntryRole::Assistant
            };
            assert_eq!(entry.role, expected);
        }
    }

    #[test]
    fn test_truncate_for_regenerate() {
        let (_d, sessions) = test_sessions();
        let c = sessions.create("t", "m", "", "s").unwrap();
        sessions
            .append_pair(&c.id, TurnEntry::user("hi"), TurnEntry::assistant("hello"))
            .unwrap();
        let target = sessions.history(&c.id).unwrap()[1].id.clone();
        sessions.truncate_for_regenerate(&c.id, &target).unwrap();
        assert!(sessions.history(&c.id).unwrap().is_empty());
    }

    #[test]
    fn test_truncate_unknown_entry_not_found() {
        let (_d, sessions) = test_sessions();
        let c = sessions.create("t", "m", "", "s").unwrap();
        assert!(matches!(
            sessions.truncate_for_regenerate(&c.id, "ghost"),
            Err(SkiffError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_deletes_directory() {
        let (_d, sessions) = test_sessions();
        let c = sessions.create("t", "m", "", "s").unwrap();
        sessions.remove(&c.id).unwrap();
        assert!(sessions.get(&c.id).unwrap().is_none());
        assert!(matches!(
            sessions.remove(&c.id),
            Err(SkiffError::NotFound { .. })
        ));
    }

    #[test]
    fn test_last_turn() {
        let (_d, sessions) = test_sessions();
        let c = sessions.create("t", "m", "", "s").unwrap();
        assert!(sessions.last_turn(&c.id).unwrap().is_empty());
        sessions
            .append_pair(&c.id, TurnEntry::user("a"), TurnEntry::assistant("b"))
            .unwrap();
        sessions
            .append_pair(&c.id, TurnEntry::user("c"), TurnEntry::assistant("d"))
            .unwrap();
        let last = sessions.last_turn(&c.id).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].content, "c");
        assert_eq!(last[1].content, "d");
    }
}
