#![cfg_attr(docsrs, feature(doc_auto_cfg))]
//! Reactive loading of remote data backed by a persisted cache.
//!
//! A [`LoadImpulseEmitter`](emitters::load_impulse_emitter::LoadImpulseEmitter) tells datasources
//! what to load. A primary datasource loads from the remote source, a cache datasource reads the
//! last persisted result, and [`CachedDatasource`](cached::CachedDatasource) merges both into one
//! state stream that never shows data loaded for incompatible parameters.

/// Merging of primary and cache datasources
pub mod cached;
/// Configuration of persisted state storage
pub mod config;
/// Datasources producing state streams.
/// Public traits are included to allow easy use of custom implementations.
pub mod datasources;
/// Load impulse emitters
pub mod emitters;
/// Error types and the datasource error trait
pub mod error;
/// Load impulses and their parameters
pub mod load_impulse;
/// Persistence of the last successful state
pub mod persisters;
/// State of a load operation
pub mod state;

mod task;
