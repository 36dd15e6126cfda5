//! Namespaced string key-value persistence.
// 中文: 按命名空间划分的字符串键值存储。
//
// Only used to cache the exported public key text. The secure key store stays
// authoritative for key existence; cached values may be stale.

use crate::error::{Error, Result};
use dashmap::DashMap;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Boundary contract of a preference store. Last write wins within a
/// namespace; there are no transactions.
pub trait PreferenceStore: Send + Sync {
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Returns the stored value, or `default` when the key is absent.
    fn get(&self, namespace: &str, key: &str, default: &str) -> Result<String>;

    /// Removes the key. Removing an absent key is not an error.
    fn remove(&self, namespace: &str, key: &str) -> Result<()>;
}

/// In-memory preferences.
#[derive(Default)]
pub struct MemoryPreferences {
    namespaces: DashMap<String, BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str, default: &str) -> Result<String> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|values| values.get(key).cloned())
            .unwrap_or_else(|| default.to_string()))
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        if let Some(mut values) = self.namespaces.get_mut(namespace) {
            values.remove(key);
        }
        Ok(())
    }
}

/// Preferences persisted as one JSON object file per namespace.
///
/// Writes are atomic (temp file + rename) and serialised by a mutex, so
/// concurrent writers resolve as last-write-wins.
///
/// 中文: 每个命名空间对应一个 JSON 文件；写入为原子操作并由互斥锁串行化。
pub struct JsonFilePreferences {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFilePreferences {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        // 命名空间可能包含任意字符，文件名只保留安全字符
        let safe: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = crate::common::utils::fingerprint(namespace.as_bytes());
        self.dir.join(format!("{}.{}.json", safe, &digest[..12]))
    }

    fn load(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                Error::Preferences(format!("{} is not a preference file: {}", path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_error(path, e)),
        }
    }

    fn save(&self, path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(values)
            .map_err(|e| Error::Preferences(e.to_string()))?;
        let write = || -> io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| io_error(path, e))
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.namespace_path(namespace);
        let mut values = self.load(&path)?;
        values.insert(key.to_string(), value.to_string());
        self.save(&path, &values)?;
        debug!("preference `{}` written in namespace `{}`", key, namespace);
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str, default: &str) -> Result<String> {
        let values = self.load(&self.namespace_path(namespace))?;
        Ok(values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.namespace_path(namespace);
        let mut values = self.load(&path)?;
        if values.remove(key).is_none() {
            return Ok(());
        }
        if values.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(&path, e)),
            }
        } else {
            self.save(&path, &values)
        }
    }
}

fn io_error(path: &Path, e: io::Error) -> Error {
    Error::Preferences(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn PreferenceStore) {
        assert_eq!(store.get("ns", "PublicKey", "KeyDoesNotExist").unwrap(), "KeyDoesNotExist");

        store.put("ns", "PublicKey", "first").unwrap();
        store.put("ns", "PublicKey", "second").unwrap();
        store.put("other", "PublicKey", "elsewhere").unwrap();
        assert_eq!(store.get("ns", "PublicKey", "").unwrap(), "second");
        assert_eq!(store.get("other", "PublicKey", "").unwrap(), "elsewhere");

        store.remove("ns", "PublicKey").unwrap();
        store.remove("ns", "PublicKey").unwrap();
        assert_eq!(store.get("ns", "PublicKey", "gone").unwrap(), "gone");
        assert_eq!(store.get("other", "PublicKey", "").unwrap(), "elsewhere");
    }

    #[test]
    fn test_memory_preferences() {
        exercise(&MemoryPreferences::new());
    }

    #[test]
    fn test_json_file_preferences() {
        let dir = tempdir().unwrap();
        exercise(&JsonFilePreferences::new(dir.path()).unwrap());
    }

    #[test]
    fn test_json_file_preferences_persist() {
        let dir = tempdir().unwrap();
        JsonFilePreferences::new(dir.path())
            .unwrap()
            .put("seal-keypair.user/keys", "PublicKey", "cached")
            .unwrap();

        let reopened = JsonFilePreferences::new(dir.path()).unwrap();
        assert_eq!(
            reopened.get("seal-keypair.user/keys", "PublicKey", "").unwrap(),
            "cached"
        );
        // 相似但不同的命名空间不会冲突
        assert_eq!(reopened.get("seal-keypair.user_keys", "PublicKey", "none").unwrap(), "none");
    }

    #[test]
    fn test_json_file_preferences_reports_garbage() {
        let dir = tempdir().unwrap();
        let prefs = JsonFilePreferences::new(dir.path()).unwrap();
        fs::write(prefs.namespace_path("ns"), b"[1, 2").unwrap();

        assert!(matches!(prefs.get("ns", "k", ""), Err(Error::Preferences(_))));
    }
}
