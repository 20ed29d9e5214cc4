//! Remote store trait for the relational backend.
//!
//! The raffle manager consumes a third-party remote data API that offers
//! generic table CRUD: select everything from a table, count rows, upsert a
//! row keyed by its identifier, delete one row, delete every row. This module
//! captures exactly that contract and nothing more.
//!
//! # Implementations
//!
//! - `PostgresRemoteStore` (in `raffle-postgres`): direct `sqlx` access
//! - `RestRemoteStore` (in `raffle-rest`): PostgREST-style HTTP API
//! - `InMemoryRemoteStore` (in `raffle-testing`): deterministic tests
//!
//! Records travel as JSON documents. Typed mapping happens in the
//! application's persistence adapter, so adapters never depend on domain
//! types.
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of `async fn` so the store
//! can be shared as `Arc<dyn RemoteStore>` and captured by effects.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A remote row, serialized as a JSON document.
pub type Record = serde_json::Value;

/// Boxed future returned by every [`RemoteStore`] method.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Errors that can occur while talking to the remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The backend could not be reached (network, pool exhausted, DNS).
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the access key.
    #[error("Remote store rejected credentials")]
    Unauthorized,

    /// The backend answered with an unexpected status.
    #[error("Remote store error (status {status}): {message}")]
    Status {
        /// Status code returned by the backend
        status: u16,
        /// Body or message returned by the backend
        message: String,
    },

    /// A query failed inside the backend.
    #[error("Remote query failed: {0}")]
    Query(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Generic table CRUD against the remote backend.
///
/// Every operation is independent: there are no transactions, and two calls
/// issued concurrently may complete in any order.
pub trait RemoteStore: Send + Sync {
    /// Human-readable backend name, used in logs.
    fn backend(&self) -> &'static str;

    /// Load every record of a table.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the backend is unreachable or the query fails.
    fn select_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, Vec<Record>>;

    /// Count the records of a table.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the backend is unreachable or the query fails.
    fn count<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64>;

    /// Insert or replace the record with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the write is rejected.
    fn upsert<'a>(&'a self, table: &'a str, id: &'a str, record: Record) -> RemoteFuture<'a, ()>;

    /// Delete one record. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the delete is rejected.
    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()>;

    /// Delete every record of a table, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if the delete is rejected.
    fn delete_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64>;
}
