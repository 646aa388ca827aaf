use std::path::PathBuf;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::persisters::state_persister::LATEST_VALUE_KEY;
use crate::persisters::store::{DiskStore, KeyValueStore, MemoryStore, TieredStore};

/// Where persisted state lives.
///
/// | `directory` | `memory_tier` | Store |
/// |-------------|---------------|-------|
/// | `None` | any | [`MemoryStore`] |
/// | `Some` | `false` | [`DiskStore`] |
/// | `Some` | `true` | [`TieredStore`] of memory in front of disk |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub directory: Option<PathBuf>,
    pub memory_tier: bool,
    pub key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            directory: None,
            memory_tier: true,
            key: LATEST_VALUE_KEY.to_string(),
        }
    }
}

impl StoreConfig {
    /// Disk-backed config with a memory tier.
    pub fn on_disk(directory: impl Into<PathBuf>) -> Self {
        StoreConfig {
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    pub fn build(&self) -> Arc<dyn KeyValueStore> {
        match &self.directory {
            None => Arc::new(MemoryStore::new()),
            Some(directory) if self.memory_tier => {
                Arc::new(TieredStore::new(MemoryStore::new(), DiskStore::new(directory)))
            }
            Some(directory) => Arc::new(DiskStore::new(directory)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: StoreConfig = serde_json::from_str(r#"{"directory": "/tmp/cache"}"#).unwrap();
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/cache")));
        assert!(config.memory_tier);
        assert_eq!(config.key, "latestValue");
    }

    #[test]
    fn builds_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            memory_tier: false,
            key: "feed".into(),
            ..StoreConfig::on_disk(dir.path())
        };
        let store = config.build();
        store.set(&config.key, b"x").unwrap();
        assert!(dir.path().join("feed.json").exists());
    }

    #[test]
    fn tiered_store_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::on_disk(dir.path()).build();
        store.set("latestValue", b"x").unwrap();
        assert!(dir.path().join("latestValue.json").exists());
    }

    #[test]
    fn memory_store_without_directory() {
        let store = StoreConfig::default().build();
        store.set("latestValue", b"x").unwrap();
        assert_eq!(store.get("latestValue").unwrap(), Some(b"x".to_vec()));
    }
}
