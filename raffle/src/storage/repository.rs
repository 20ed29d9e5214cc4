//! Remote-first repository with local cache fallback.

use super::{
    PersistOutcome, Record, ASSIGNMENTS, ASSIGNMENT_HOLDERS, CASCADE_ORDER, LAST_SYNC,
    NUMBER_OWNERS, RAFFLE_ARCHIVE, RAFFLE_CONFIG, RESERVATIONS, SALES,
};
use crate::error::SyncError;
use crate::types::{ArchivedRaffle, RaffleConfig, RaffleSnapshot};
use chrono::{DateTime, Utc};
use raffle_core::cache::{CacheError, LocalCache};
use raffle_core::remote::{RemoteError, RemoteStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where a load came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// Remote store answered every read
    Remote,
    /// Remote store failed or is offline; data comes from the local cache
    LocalCache {
        /// Why the remote store was not used
        reason: String,
    },
}

/// Result of loading every collection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Loaded data
    pub snapshot: RaffleSnapshot,
    /// Where it came from
    pub source: LoadSource,
}

/// Result of a cascade delete
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Tables cleared, in order
    pub cleared: Vec<&'static str>,
    /// Remote rows removed
    pub remote_rows_removed: u64,
    /// Table where the cascade stopped, and why
    pub failed: Option<(&'static str, String)>,
}

impl CascadeReport {
    /// Every requested table was cleared
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

/// Persistence adapter for every raffle collection
///
/// Cache collections are JSON objects keyed by record id. Cache mutations
/// are serialized so concurrent writes to one collection do not lose each
/// other.
pub struct RaffleRepository {
    remote: Option<Arc<dyn RemoteStore>>,
    cache: Arc<dyn LocalCache>,
    offline_reason: String,
    cache_lock: Mutex<()>,
}

impl std::fmt::Debug for RaffleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaffleRepository")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

impl RaffleRepository {
    /// Repository writing to `remote` first, `cache` as mirror and fallback
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            remote: Some(remote),
            cache,
            offline_reason: String::new(),
            cache_lock: Mutex::new(()),
        }
    }

    /// Repository without a remote store
    #[must_use]
    pub fn offline(cache: Arc<dyn LocalCache>, reason: impl Into<String>) -> Self {
        Self {
            remote: None,
            cache,
            offline_reason: reason.into(),
            cache_lock: Mutex::new(()),
        }
    }

    /// Whether a remote store is configured
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.remote.is_some()
    }

    /// Name of the remote backend, or `offline`
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.remote.as_ref().map_or("offline", |r| r.backend())
    }

    /// Why no remote store is used
    #[must_use]
    pub fn offline_reason(&self) -> Option<&str> {
        self.remote.is_none().then_some(self.offline_reason.as_str())
    }

    fn require_remote(&self) -> Result<&Arc<dyn RemoteStore>, SyncError> {
        self.remote
            .as_ref()
            .ok_or_else(|| SyncError::Offline(self.offline_reason.clone()))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace one record
    pub async fn save<T: Record>(&self, record: &T) -> PersistOutcome {
        let id = record.record_id();
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                return PersistOutcome::Failed {
                    reason: format!("cannot encode {}/{id}: {e}", T::TABLE),
                };
            },
        };

        let remote = match &self.remote {
            Some(remote) => Some(remote.upsert(T::TABLE, &id, value.clone()).await),
            None => None,
        };
        let cached = self
            .update_collection(T::TABLE, |entries| {
                entries.insert(id.clone(), value);
            })
            .await;

        self.outcome(T::TABLE, &id, remote, cached)
    }

    /// Delete one record
    pub async fn delete<T: Record>(&self, id: &str) -> PersistOutcome {
        let remote = match &self.remote {
            Some(remote) => Some(remote.delete(T::TABLE, id).await),
            None => None,
        };
        let cached = self
            .update_collection(T::TABLE, |entries| {
                entries.remove(id);
            })
            .await;

        self.outcome(T::TABLE, id, remote, cached)
    }

    fn outcome(
        &self,
        table: &str,
        id: &str,
        remote: Option<Result<(), RemoteError>>,
        cached: Result<(), CacheError>,
    ) -> PersistOutcome {
        if let Err(e) = &cached {
            tracing::warn!(table, id, error = %e, "Local cache write failed");
        }

        match (remote, cached) {
            (Some(Ok(())), _) => PersistOutcome::Remote,
            (Some(Err(remote_error)), Ok(())) => {
                tracing::warn!(table, id, error = %remote_error, "Remote write failed, kept in local cache");
                metrics::counter!("raffle.persist.local_fallback", "table" => table.to_string())
                    .increment(1);
                PersistOutcome::LocalFallback {
                    reason: remote_error.to_string(),
                }
            },
            (None, Ok(())) => PersistOutcome::LocalFallback {
                reason: format!("offline: {}", self.offline_reason),
            },
            (remote, Err(cache_error)) => {
                metrics::counter!("raffle.persist.failed", "table" => table.to_string())
                    .increment(1);
                let remote_reason = match remote {
                    Some(Err(e)) => e.to_string(),
                    _ => format!("offline: {}", self.offline_reason),
                };
                tracing::error!(table, id, remote = %remote_reason, cache = %cache_error, "Write lost");
                PersistOutcome::Failed {
                    reason: format!("{remote_reason}; {cache_error}"),
                }
            },
        }
    }

    async fn update_collection<F>(&self, key: &str, update: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut Map<String, Value>) + Send,
    {
        let _guard = self.cache_lock.lock().await;
        let mut entries = match self.cache.get(key).await? {
            Some(Value::Object(entries)) => entries,
            _ => Map::new(),
        };
        update(&mut entries);
        self.cache.set(key, Value::Object(entries)).await
    }

    /// Append a summary of a replaced raffle to the local archive
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the archive cannot be read or written.
    pub async fn append_archive(&self, archived: &ArchivedRaffle) -> Result<(), CacheError> {
        let value = serde_json::to_value(archived)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let _guard = self.cache_lock.lock().await;
        let mut archive = match self.cache.get(RAFFLE_ARCHIVE).await? {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        archive.push(value);
        self.cache.set(RAFFLE_ARCHIVE, Value::Array(archive)).await
    }

    /// Archived raffles, oldest first
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the archive cannot be read.
    pub async fn load_archive(&self) -> Result<Vec<ArchivedRaffle>, CacheError> {
        Ok(match self.cache.get(RAFFLE_ARCHIVE).await? {
            Some(Value::Array(entries)) => decode_all(RAFFLE_ARCHIVE, entries),
            _ => Vec::new(),
        })
    }

    /// Delete every dependent collection, and the configuration when
    /// `include_config` is set.
    ///
    /// Tables are cleared one after the other (owners, assignments, holders,
    /// reservations, sales, config). The first failure stops the cascade;
    /// tables already cleared stay cleared.
    pub async fn reset_cascade(&self, include_config: bool) -> CascadeReport {
        let mut report = CascadeReport::default();

        for table in CASCADE_ORDER {
            if table == RAFFLE_CONFIG && !include_config {
                continue;
            }

            if let Some(remote) = &self.remote {
                match remote.delete_all(table).await {
                    Ok(rows) => report.remote_rows_removed += rows,
                    Err(e) => {
                        tracing::warn!(table, error = %e, cleared = ?report.cleared, "Cascade delete stopped");
                        report.failed = Some((table, e.to_string()));
                        return report;
                    },
                }
            }

            let removed = {
                let _guard = self.cache_lock.lock().await;
                self.cache.remove(table).await
            };
            if let Err(e) = removed {
                tracing::warn!(table, error = %e, "Cascade delete stopped at local cache");
                report.failed = Some((table, e.to_string()));
                return report;
            }

            report.cleared.push(table);
        }

        tracing::info!(
            tables = report.cleared.len(),
            remote_rows = report.remote_rows_removed,
            "Cascade delete complete"
        );
        report
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read every collection from the remote store
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Offline`] without a remote store, or the first
    /// remote read error.
    pub async fn fetch_remote(&self) -> Result<RaffleSnapshot, SyncError> {
        let remote = self.require_remote()?;

        let (configs, sales, reservations, assignments, holders, owners) = futures::try_join!(
            remote.select_all(RAFFLE_CONFIG),
            remote.select_all(SALES),
            remote.select_all(RESERVATIONS),
            remote.select_all(ASSIGNMENTS),
            remote.select_all(ASSIGNMENT_HOLDERS),
            remote.select_all(NUMBER_OWNERS),
        )?;

        Ok(RaffleSnapshot {
            config: latest_config(decode_all(RAFFLE_CONFIG, configs)),
            sales: decode_all(SALES, sales),
            reservations: decode_all(RESERVATIONS, reservations),
            assignments: decode_all(ASSIGNMENTS, assignments),
            holders: decode_all(ASSIGNMENT_HOLDERS, holders),
            owners: decode_all(NUMBER_OWNERS, owners),
        })
    }

    /// Read every collection from the local cache
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if a document cannot be read.
    pub async fn load_cached(&self) -> Result<RaffleSnapshot, CacheError> {
        Ok(RaffleSnapshot {
            config: latest_config(self.cached_collection(RAFFLE_CONFIG).await?),
            sales: self.cached_collection(SALES).await?,
            reservations: self.cached_collection(RESERVATIONS).await?,
            assignments: self.cached_collection(ASSIGNMENTS).await?,
            holders: self.cached_collection(ASSIGNMENT_HOLDERS).await?,
            owners: self.cached_collection(NUMBER_OWNERS).await?,
        })
    }

    async fn cached_collection<T: Record>(&self, key: &str) -> Result<Vec<T>, CacheError> {
        Ok(match self.cache.get(key).await? {
            Some(Value::Object(entries)) => decode_all(key, entries.into_iter().map(|(_, v)| v)),
            Some(Value::Array(entries)) => decode_all(key, entries),
            _ => Vec::new(),
        })
    }

    /// Load every collection: remote first, local cache when the remote
    /// store fails or is offline.
    ///
    /// A successful remote load is merged into the cache so a later outage
    /// falls back to the full data set.
    pub async fn load(&self) -> LoadOutcome {
        let reason = match self.fetch_remote().await {
            Ok(snapshot) => {
                if let Err(e) = self.mirror_remote(&snapshot).await {
                    tracing::warn!(error = %e, "Could not mirror remote data into local cache");
                }
                return LoadOutcome {
                    snapshot,
                    source: LoadSource::Remote,
                };
            },
            Err(e) => e.to_string(),
        };

        if self.is_online() {
            tracing::warn!(reason = %reason, "Remote load failed, using local cache");
        }

        let snapshot = self.load_cached().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Local cache unreadable, starting empty");
            RaffleSnapshot::default()
        });

        LoadOutcome {
            snapshot,
            source: LoadSource::LocalCache { reason },
        }
    }

    /// Merge a remote snapshot into the cache, record by record
    ///
    /// Remote rows replace cached rows with the same id. Rows only the cache
    /// holds (writes that fell back locally, or data a reset remote lost)
    /// are kept, so drift detection still sees them.
    ///
    /// # Errors
    ///
    /// Returns the first [`CacheError`]; earlier collections stay merged.
    pub async fn mirror_remote(&self, snapshot: &RaffleSnapshot) -> Result<(), CacheError> {
        self.merge_collection(RAFFLE_CONFIG, encode_entries(snapshot.config.iter())?)
            .await?;
        self.merge_collection(SALES, encode_entries(&snapshot.sales)?)
            .await?;
        self.merge_collection(RESERVATIONS, encode_entries(&snapshot.reservations)?)
            .await?;
        self.merge_collection(ASSIGNMENTS, encode_entries(&snapshot.assignments)?)
            .await?;
        self.merge_collection(ASSIGNMENT_HOLDERS, encode_entries(&snapshot.holders)?)
            .await?;
        self.merge_collection(NUMBER_OWNERS, encode_entries(&snapshot.owners)?)
            .await
    }

    async fn merge_collection(
        &self,
        key: &str,
        fresh: Map<String, Value>,
    ) -> Result<(), CacheError> {
        self.update_collection(key, move |entries| entries.extend(fresh))
            .await
    }

    /// Sales held in the local cache
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the sales document cannot be read.
    pub async fn cached_sale_count(&self) -> Result<u64, CacheError> {
        Ok(match self.cache.get(SALES).await? {
            Some(Value::Object(entries)) => entries.len() as u64,
            Some(Value::Array(entries)) => entries.len() as u64,
            _ => 0,
        })
    }

    /// Sales held by the remote store
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when offline or when the count fails.
    pub async fn remote_sale_count(&self) -> Result<u64, SyncError> {
        Ok(self.require_remote()?.count(SALES).await?)
    }

    /// Insert a record into the remote store only
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when offline or when the write fails.
    pub async fn upsert_remote<T: Record>(&self, record: &T) -> Result<(), SyncError> {
        let value = serde_json::to_value(record)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        self.require_remote()?
            .upsert(T::TABLE, &record.record_id(), value)
            .await?;
        Ok(())
    }

    /// Drop every cached document
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be cleared.
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        let _guard = self.cache_lock.lock().await;
        self.cache.clear().await
    }

    /// Replace every cached collection with `snapshot`
    ///
    /// # Errors
    ///
    /// Returns the first [`CacheError`]; earlier collections stay written.
    pub async fn write_cache_snapshot(
        &self,
        snapshot: &RaffleSnapshot,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<(), CacheError> {
        let _guard = self.cache_lock.lock().await;
        self.cache
            .set(RAFFLE_CONFIG, encode_all(snapshot.config.iter())?)
            .await?;
        self.cache.set(SALES, encode_all(&snapshot.sales)?).await?;
        self.cache
            .set(RESERVATIONS, encode_all(&snapshot.reservations)?)
            .await?;
        self.cache
            .set(ASSIGNMENTS, encode_all(&snapshot.assignments)?)
            .await?;
        self.cache
            .set(ASSIGNMENT_HOLDERS, encode_all(&snapshot.holders)?)
            .await?;
        self.cache
            .set(NUMBER_OWNERS, encode_all(&snapshot.owners)?)
            .await?;
        if let Some(at) = last_sync {
            self.cache
                .set(LAST_SYNC, Value::String(at.to_rfc3339()))
                .await?;
        }
        Ok(())
    }

    /// When the cache was last rebuilt from the remote store
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the timestamp cannot be read.
    pub async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(match self.cache.get(LAST_SYNC).await? {
            Some(Value::String(at)) => DateTime::parse_from_rfc3339(&at)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
            _ => None,
        })
    }
}

/// Decode rows, skipping (and logging) rows written in an unknown shape
fn decode_all<T, I>(table: &str, values: I) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
    I: IntoIterator<Item = Value>,
{
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table, error = %e, "Skipping malformed record");
                None
            },
        })
        .collect()
}

fn encode_all<'a, T: Record + 'a>(records: impl IntoIterator<Item = &'a T>) -> Result<Value, CacheError> {
    encode_entries(records).map(Value::Object)
}

fn encode_entries<'a, T: Record + 'a>(
    records: impl IntoIterator<Item = &'a T>,
) -> Result<Map<String, Value>, CacheError> {
    let mut entries = Map::new();
    for record in records {
        let value = serde_json::to_value(record)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        entries.insert(record.record_id(), value);
    }
    Ok(entries)
}

fn latest_config(configs: Vec<RaffleConfig>) -> Option<RaffleConfig> {
    configs.into_iter().max_by_key(|c| c.created_at)
}
