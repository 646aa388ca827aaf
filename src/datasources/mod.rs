/// Common datasource code
pub mod datasource;

/// Loader trait and the primary datasource driven by it
pub mod loader;

/// Loader that uses the reqwest HTTP client to load JSON from a remote source
#[cfg(feature = "http")]
pub mod http;

/// Datasource fed by its owner
pub mod manual;

/// Datasource reading the last persisted state
pub mod plain_cache;

/// Decorator keeping the last result visible during reloads
pub mod retain_last_result;
