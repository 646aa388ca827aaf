use std::fmt::{Debug, Display, Formatter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message an error shows to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorMessage {
    /// The consumer picks its own generic wording.
    #[default]
    Default,
    Message(String),
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorMessage::Default => write!(f, "an error occurred"),
            ErrorMessage::Message(text) => write!(f, "{text}"),
        }
    }
}

/// Marker for a cache read that found nothing usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("no cached state available")]
pub struct CacheLoadError;

/// Error type carried by [`State`](crate::state::State).
///
/// Errors are values in the state stream, not failures of the stream itself,
/// so they have to be comparable and cheap to clone.
pub trait DatasourceError: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Error shown when the cache has no state for the requested parameters.
    fn from_cache_load_error(error: CacheLoadError) -> Self;

    fn error_message(&self) -> ErrorMessage;
}

/// Failure of a [`KeyValueStore`](crate::persisters::store::KeyValueStore) or of (de)serializing stored state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored state could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of [`CachedDatasource::load_deferred`](crate::cached::CachedDatasource::load_deferred).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredLoadError {
    #[error("datasource stopped before the load finished")]
    Closed,
}
