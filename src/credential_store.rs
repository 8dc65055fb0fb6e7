//! Credential store contract (spec §6): an abstract key-value store,
//! opaque to the core pipeline. Only the CLI depends on a concrete
//! implementation; the library itself never reaches for one.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub max_age_ms: Option<i64>,
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, options: Option<SetOptions>);
    fn delete(&self, key: &str);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Minimal JSON-file-backed `CredentialStore`, used only by the CLI for
/// its own convenience — not prescribed by the spec, which only
/// requires the abstract interface above.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> HashMap<String, StoredEntry> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn save(&self, entries: &HashMap<String, StoredEntry>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(text) = serde_json::to_string_pretty(entries) {
            let _ = fs::write(&self.path, text);
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.load();
        let entry = entries.get(key)?;
        if let Some(expires_at) = entry.expires_at {
            if expires_at <= Utc::now() {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: &str, options: Option<SetOptions>) {
        let mut entries = self.load();
        let expires_at = options.and_then(|o| {
            o.expires_at
                .or_else(|| o.max_age_ms.map(|ms| Utc::now() + chrono::Duration::milliseconds(ms)))
        });
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.save(&entries);
    }

    fn delete(&self, key: &str) {
        let mut entries = self.load();
        entries.remove(key);
        self.save(&entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!("skillforge-test-{}", std::process::id()));
        let store = FileCredentialStore::new(dir.join("creds.json"));
        store.set("refresh_token", "abc", None);
        assert_eq!(store.get("refresh_token").as_deref(), Some("abc"));
        store.delete("refresh_token");
        assert_eq!(store.get("refresh_token"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let dir = std::env::temp_dir().join(format!("skillforge-test-expiry-{}", std::process::id()));
        let store = FileCredentialStore::new(dir.join("creds.json"));
        store.set(
            "short_lived",
            "val",
            Some(SetOptions {
                expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
                max_age_ms: None,
            }),
        );
        assert_eq!(store.get("short_lived"), None);
        let _ = fs::remove_dir_all(&dir);
    }
}
