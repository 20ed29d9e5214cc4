//! Local cache trait.
//!
//! The local cache is a flat key/value space of JSON documents. It plays two
//! roles: an offline copy of every collection, and the fallback target when a
//! remote write fails.
//!
//! # Implementations
//!
//! - `FileCache` (in `raffle`): one JSON file per key in a directory
//! - `InMemoryLocalCache` (in `raffle-testing`): `HashMap`-backed, for tests

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every [`LocalCache`] method.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Errors that can occur while reading or writing the local cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The underlying storage failed.
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// A stored document could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Key/value storage for JSON documents on the local machine.
pub trait LocalCache: Send + Sync {
    /// Read a document. Missing keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the storage cannot be read or the document is corrupt.
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<serde_json::Value>>;

    /// Write a document, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the storage cannot be written.
    fn set<'a>(&'a self, key: &'a str, value: serde_json::Value) -> CacheFuture<'a, ()>;

    /// Remove a document. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the storage cannot be written.
    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;

    /// Remove every document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the storage cannot be written.
    fn clear(&self) -> CacheFuture<'_, ()>;
}
