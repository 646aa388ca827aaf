use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use arc_swap::ArcSwap;
use crate::error::StoreError;

/// Byte store addressed by string keys.
///
/// Calls are synchronous and expected to be fast. Errors are reported, never retried.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store.
///
/// Readers load an immutable snapshot of the map; writers swap in a modified copy.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: ArcSwap<HashMap<String, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.load().get(key).map(|value| value.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let value: Arc<[u8]> = Arc::from(value);
        self.entries.rcu(|entries| {
            let mut entries = HashMap::clone(entries);
            entries.insert(key.to_owned(), value.clone());
            entries
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.rcu(|entries| {
            let mut entries = HashMap::clone(entries);
            entries.remove(key);
            entries
        });
        Ok(())
    }
}

/// Store keeping one file per key in a directory.
///
/// Writes go to a temporary file that is renamed over the old one, so a crash never leaves
/// a half-written value behind.
#[derive(Debug, Clone)]
pub struct DiskStore {
    directory: PathBuf,
}

impl DiskStore {
    /// The directory is created on first write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DiskStore {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, key: &str) -> PathBuf {
        let file_name: String = key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path(key);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, value)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Two-tier store: a fast front tier (usually [`MemoryStore`]) in front of a durable back tier.
pub struct TieredStore<Front, Back> {
    front: Front,
    back: Back,
}

impl <Front: KeyValueStore, Back: KeyValueStore> TieredStore<Front, Back> {
    pub fn new(front: Front, back: Back) -> Self {
        TieredStore {
            front,
            back,
        }
    }
}

impl <Front: KeyValueStore, Back: KeyValueStore> KeyValueStore for TieredStore<Front, Back> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.front.get(key)? {
            return Ok(Some(value));
        }
        let value = self.back.get(key)?;
        if let Some(value) = &value {
            if let Err(err) = self.front.set(key, value) {
                tracing::warn!(key, error = %err, "failed to fill front tier");
            }
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.back.set(key, value)?;
        self.front.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let front = self.front.remove(key);
        self.back.remove(key)?;
        front
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", b"one").unwrap();
        store.set("a", b"two").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"two".to_vec()));
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn disk_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("cache"));
        store.set("latestValue", b"{}").unwrap();

        let reopened = DiskStore::new(dir.path().join("cache"));
        assert_eq!(reopened.get("latestValue").unwrap(), Some(b"{}".to_vec()));
        assert!(dir.path().join("cache").join("latestValue.json").exists());
        assert!(!dir.path().join("cache").join("latestValue.json.tmp").exists());

        reopened.remove("latestValue").unwrap();
        reopened.remove("latestValue").unwrap();
        assert_eq!(store.get("latestValue").unwrap(), None);
    }

    #[test]
    fn disk_keys_stay_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        store.set("../escape", b"x").unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn tiered_fills_front_from_back() {
        let dir = tempfile::tempdir().unwrap();
        DiskStore::new(dir.path()).set("k", b"v").unwrap();

        let store = TieredStore::new(MemoryStore::new(), DiskStore::new(dir.path()));
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.front.get("k").unwrap(), Some(b"v".to_vec()));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn tiered_writes_both() {
        let dir = tempfile::tempdir().unwrap();
        let store = TieredStore::new(MemoryStore::new(), DiskStore::new(dir.path()));
        store.set("k", b"v").unwrap();
        assert_eq!(store.front.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.back.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
