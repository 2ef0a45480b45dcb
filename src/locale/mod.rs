// src/locale/mod.rs — Language catalog and localized UI tokens
//
// Only strings the daemon itself emits live here (error prefixes, the
// interrupted marker). The desktop shell ships its own bundles.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::infra::errors::SkiffError;
use crate::infra::paths;
use crate::store::ObjectStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub name: String,
}

pub fn languages() -> Vec<Language> {
    vec![
        Language {
            code: "en".into(),
            name: "English".into(),
        },
        Language {
            code: "zh".into(),
            name: "简体中文".into(),
        },
    ]
}

const EN: &[(&str, &str)] = &[
    ("chat.interrupted", "[generation interrupted]"),
    ("error.not_found", "not found"),
    ("error.invalid_request", "invalid request"),
    ("error.conflict", "conflict"),
    ("error.upstream_failure", "model service failed"),
    ("error.upstream_timeout", "model service timed out"),
    ("error.canceled", "request canceled"),
    ("error.storage_failure", "storage failure"),
    ("error.internal", "internal error"),
];

const ZH: &[(&str, &str)] = &[
    ("chat.interrupted", "[回复意外中断]"),
    ("error.not_found", "资源不存在"),
    ("error.invalid_request", "请求无效"),
    ("error.conflict", "资源冲突"),
    ("error.upstream_failure", "模型服务调用失败"),
    ("error.upstream_timeout", "模型服务调用超时"),
    ("error.canceled", "请求已取消"),
    ("error.storage_failure", "存储失败"),
    ("error.internal", "内部错误"),
];

#[derive(Debug, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default)]
    language: Option<String>,
}

pub struct LocaleStore {
    store: Arc<ObjectStore>,
    current: Mutex<String>,
}

impl LocaleStore {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        let current = store
            .read::<Settings>(&paths::settings_file())
            .ok()
            .flatten()
            .and_then(|s| s.language)
            .unwrap_or_else(|| "en".into());
        Self {
            store,
            current: Mutex::new(current),
        }
    }

    pub fn current(&self) -> String {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_language(&self, code: &str) -> Result<(), SkiffError> {
        if !languages().iter().any(|l| l.code == code) {
            return Err(SkiffError::InvalidRequest(format!(
                "unknown language '{code}'"
            )));
        }
        self.store.write(
            &paths::settings_file(),
            &Settings {
                language: Some(code.to_string()),
            },
        )?;
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = code.to_string();
        Ok(())
    }

    /// Look up a token in the current language, falling back to English,
    /// then to the key itself.
    pub fn text(&self, key: &str) -> String {
        let lang = self.current();
        let table = match lang.as_str() {
            "zh" => ZH,
            _ => EN,
        };
        table
            .iter()
            .chain(EN.iter())
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_locale() -> (tempfile::TempDir, LocaleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        (dir, LocaleStore::new(store))
    }

    #[test]
    fn test_default_language_en() {
        let (_d, locale) = test_locale();
        assert_eq!(locale.current(), "en");
        assert_eq!(locale.text("error.not_found"), "not found");
    }

    #[test]
    fn test_set_language_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::new(dir.path()));
        let locale = LocaleStore::new(store.clone());
        locale.set_language("zh").unwrap();
        assert_eq!(locale.text("error.conflict"), "资源冲突");

        // A fresh instance reads the persisted choice.
        let reloaded = LocaleStore::new(store);
        assert_eq!(reloaded.current(), "zh");
    }

    #[test]
    fn test_unknown_language_rejected() {
        let (_d, locale) = test_locale();
        assert!(locale.set_language("xx").is_err());
    }

    #[test]
    fn test_missing_key_falls_back_to_key() {
        let (_d, locale) = test_locale();
        assert_eq!(locale.text("no.such.key"), "no.such.key");
    }
}
