use std::marker::PhantomData;
use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::config::StoreConfig;
use crate::error::{DatasourceError, StoreError};
use crate::load_impulse::{LoadImpulse, Parameters};
use crate::persisters::store::KeyValueStore;
use crate::state::{State, StateValue};

/// Key the latest state is stored under.
pub const LATEST_VALUE_KEY: &str = "latestValue";

/// Storage of the last successful state.
///
/// `load` must only return a state whose parameters are cache compatible with the requested ones.
pub trait StatePersister<V, P, E>: Send + Sync + 'static {
    /// Replaces the stored state. Last write wins.
    fn persist(&self, state: &State<V, P, E>) -> Result<(), StoreError>;

    /// Stored state, if any and if usable for `parameters`.
    fn load(&self, parameters: &P) -> Option<State<V, P, E>>;

    fn purge(&self) -> Result<(), StoreError>;
}

#[derive(Serialize)]
struct PersistedStateRef<'a, V, P, E> {
    state: &'a State<V, P, E>,
    load_impulse: &'a LoadImpulse<P>,
}

#[derive(Deserialize)]
struct PersistedState<V, P, E> {
    state: State<V, P, E>,
    load_impulse: LoadImpulse<P>,
}

/// Persister writing `{ state, load_impulse }` as JSON into a [`KeyValueStore`].
pub struct JsonStatePersister<V, P, E> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> (V, P, E)>,
}

impl <V, P, E> JsonStatePersister<V, P, E> {
    /// Persister using [`LATEST_VALUE_KEY`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, LATEST_VALUE_KEY)
    }

    /// Persister using its own key, so several persisters can share one store.
    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        JsonStatePersister {
            store,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_key(config.build(), config.key.clone())
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl <V, P, E> StatePersister<V, P, E> for JsonStatePersister<V, P, E>
where
    V: StateValue + Serialize + DeserializeOwned,
    P: Parameters + Serialize + DeserializeOwned,
    E: DatasourceError + Serialize + DeserializeOwned,
{
    fn persist(&self, state: &State<V, P, E>) -> Result<(), StoreError> {
        let Some(load_impulse) = state.load_impulse() else {
            tracing::debug!(key = %self.key, "not persisting a state without load impulse");
            return Ok(());
        };
        let bytes = serde_json::to_vec(&PersistedStateRef { state, load_impulse })?;
        self.store.set(&self.key, &bytes)
    }

    fn load(&self, parameters: &P) -> Option<State<V, P, E>> {
        let bytes = match self.store.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to read persisted state");
                return None;
            }
        };
        let persisted: PersistedState<V, P, E> = match serde_json::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "discarding unreadable persisted state");
                return None;
            }
        };
        if !persisted.load_impulse.parameters.is_cache_compatible(parameters) {
            tracing::debug!(key = %self.key, ?parameters, "persisted state belongs to other parameters");
            return None;
        }
        Some(persisted.state)
    }

    fn purge(&self) -> Result<(), StoreError> {
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persisters::store::{DiskStore, MemoryStore};
    use crate::state::tests::{impulse, Account, TestError, TestState};

    fn memory_persister() -> (Arc<MemoryStore>, JsonStatePersister<String, Account, TestError>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), JsonStatePersister::new(store))
    }

    #[test]
    fn round_trip() {
        let (_, persister) = memory_persister();
        let state: TestState = State::success(impulse(1, 1), "value".into());
        persister.persist(&state).unwrap();
        assert_eq!(persister.load(&Account { user: 1, page: 3 }), Some(state));
    }

    #[test]
    fn rejects_foreign_parameters() {
        let (_, persister) = memory_persister();
        persister.persist(&State::success(impulse(1, 1), "value".to_string())).unwrap();
        assert_eq!(persister.load(&Account { user: 2, page: 1 }), None);
    }

    #[test]
    fn last_write_wins() {
        let (_, persister) = memory_persister();
        persister.persist(&State::success(impulse(1, 1), "old".to_string())).unwrap();
        persister.persist(&State::success(impulse(1, 2), "new".to_string())).unwrap();
        let loaded = persister.load(&Account { user: 1, page: 1 }).unwrap();
        assert_eq!(loaded.value(), Some(&"new".to_string()));
    }

    #[test]
    fn purge_removes_state() {
        let (_, persister) = memory_persister();
        persister.persist(&State::success(impulse(1, 1), "value".to_string())).unwrap();
        persister.purge().unwrap();
        assert_eq!(persister.load(&Account { user: 1, page: 1 }), None);
    }

    #[test]
    fn not_ready_is_not_persisted() {
        let (store, persister) = memory_persister();
        persister.persist(&TestState::NotReady).unwrap();
        assert_eq!(store.get(LATEST_VALUE_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_data_reads_as_missing() {
        let (store, persister) = memory_persister();
        store.set(LATEST_VALUE_KEY, b"not json").unwrap();
        assert_eq!(persister.load(&Account { user: 1, page: 1 }), None);
    }

    #[test]
    fn keys_separate_persisters() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = JsonStatePersister::<String, Account, TestError>::with_key(store.clone(), "first");
        let second = JsonStatePersister::<String, Account, TestError>::with_key(store, "second");
        first.persist(&State::success(impulse(1, 1), "a".to_string())).unwrap();
        assert_eq!(second.load(&Account { user: 1, page: 1 }), None);
        assert_eq!(first.key(), "first");
    }

    #[test]
    fn disk_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let state: TestState = State::failure(impulse(4, 1), TestError::Remote("x".into()), Some("kept".into()));
        JsonStatePersister::<String, Account, TestError>::new(Arc::new(DiskStore::new(dir.path()))).persist(&state).unwrap();

        let reopened = JsonStatePersister::<String, Account, TestError>::new(Arc::new(DiskStore::new(dir.path())));
        assert_eq!(reopened.load(&Account { user: 4, page: 1 }), Some(state));
    }
}
