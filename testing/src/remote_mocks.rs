//! In-memory persistence adapters for testing.
//!
//! Both mocks are cheap to clone; clones share the same storage so a test can
//! hand one copy to the code under test and inspect the other.

#![allow(clippy::unwrap_used)] // Test infrastructure

use raffle_core::cache::{CacheFuture, LocalCache};
use raffle_core::remote::{Record, RemoteError, RemoteFuture, RemoteStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Rows of one table in insertion order, keyed by id.
#[derive(Debug, Default, Clone)]
struct Table {
    order: Vec<String>,
    rows: HashMap<String, Record>,
}

impl Table {
    fn upsert(&mut self, id: &str, record: Record) {
        if self.rows.insert(id.to_string(), record).is_none() {
            self.order.push(id.to_string());
        }
    }

    fn remove(&mut self, id: &str) {
        if self.rows.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
        }
    }

    fn records(&self) -> Vec<Record> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect()
    }
}

/// In-memory remote store for testing
///
/// Records are kept per table in insertion order. Reads and writes can be
/// made to fail, globally or for a single table, to exercise fallback and
/// abort paths.
///
/// # Example
///
/// ```
/// use raffle_testing::InMemoryRemoteStore;
/// use raffle_core::remote::RemoteStore;
///
/// # tokio_test::block_on(async {
/// let remote = InMemoryRemoteStore::new();
/// remote.seed("sales", "s-1", serde_json::json!({"id": "s-1"}));
///
/// assert_eq!(remote.count("sales").await.unwrap(), 1);
///
/// remote.fail_reads(true);
/// assert!(remote.count("sales").await.is_err());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemoteStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    failing_tables: Arc<RwLock<HashSet<String>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryRemoteStore {
    /// Create an empty remote store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing failure injection
    pub fn seed(&self, table: &str, id: &str, record: Record) {
        self.tables
            .write()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .upsert(id, record);
    }

    /// Snapshot of a table's records, in insertion order
    #[must_use]
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .map(Table::records)
            .unwrap_or_default()
    }

    /// Number of records in a table
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Check if a table is empty
    #[must_use]
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Make every read fail with [`RemoteError::Unavailable`]
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with [`RemoteError::Unavailable`]
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every operation on one table fail
    pub fn fail_table(&self, table: &str) {
        self.failing_tables
            .write()
            .unwrap()
            .insert(table.to_string());
    }

    /// Number of trait calls served (including failed ones)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, table: &str, write: bool) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let global = if write {
            self.fail_writes.load(Ordering::SeqCst)
        } else {
            self.fail_reads.load(Ordering::SeqCst)
        };
        if global || self.failing_tables.read().unwrap().contains(table) {
            return Err(RemoteError::Unavailable(format!(
                "injected failure on {table}"
            )));
        }
        Ok(())
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn select_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, Vec<Record>> {
        Box::pin(async move {
            self.check(table, false)?;
            Ok(self.records(table))
        })
    }

    fn count<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            self.check(table, false)?;
            Ok(self.len(table) as u64)
        })
    }

    fn upsert<'a>(&'a self, table: &'a str, id: &'a str, record: Record) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.check(table, true)?;
            self.seed(table, id, record);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.check(table, true)?;
            if let Some(rows) = self.tables.write().unwrap().get_mut(table) {
                rows.remove(id);
            }
            Ok(())
        })
    }

    fn delete_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            self.check(table, true)?;
            let removed = self
                .tables
                .write()
                .unwrap()
                .remove(table)
                .map_or(0, |t| t.rows.len());
            Ok(removed as u64)
        })
    }
}

/// In-memory local cache for testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocalCache {
    entries: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl InMemoryLocalCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    /// Read a document synchronously
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Write a document synchronously
    pub fn put(&self, key: &str, value: serde_json::Value) {
        self.entries.write().unwrap().insert(key.to_string(), value);
    }
}

impl LocalCache for InMemoryLocalCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<serde_json::Value>> {
        Box::pin(async move { Ok(self.peek(key)) })
    }

    fn set<'a>(&'a self, key: &'a str, value: serde_json::Value) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.put(key, value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            self.entries.write().unwrap().remove(key);
            Ok(())
        })
    }

    fn clear(&self) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            self.entries.write().unwrap().clear();
            Ok(())
        })
    }
}
