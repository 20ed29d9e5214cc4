//! Reconciliation between the local cache and the remote store.
//!
//! Drift is a divergence between the number of sales held in the local
//! cache and in the remote store. A remote count of zero against a non-empty
//! cache usually means somebody reset the remote data. Force sync resolves
//! drift destructively: the remote store wins and local-only changes are
//! lost.

use crate::config::RaffleDefaults;
use crate::error::SyncError;
use crate::storage::RaffleRepository;
use crate::types::RaffleSnapshot;
use chrono::{DateTime, Utc};
use raffle_core::remote::RemoteStore;
use serde::{Deserialize, Serialize};

/// Classification of a count comparison
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Drift {
    /// Same count on both sides
    InSync,
    /// Counts differ
    SyncNeeded,
    /// Remote store is empty while the local cache is not
    PossibleRemoteReset,
}

/// Outcome of a drift check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Sales held locally
    pub local_sales: u64,
    /// Sales held remotely
    pub remote_sales: u64,
    /// Classification
    pub drift: Drift,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
}

impl DriftReport {
    /// Whether the remote store looks reset
    #[must_use]
    pub fn possible_remote_reset(&self) -> bool {
        self.drift == Drift::PossibleRemoteReset
    }

    /// Whether the counts differ at all
    #[must_use]
    pub fn sync_needed(&self) -> bool {
        self.drift != Drift::InSync
    }
}

/// Classify a pair of sale counts
#[must_use]
pub const fn classify(local_sales: u64, remote_sales: u64) -> Drift {
    if remote_sales < local_sales && remote_sales == 0 {
        Drift::PossibleRemoteReset
    } else if remote_sales != local_sales {
        Drift::SyncNeeded
    } else {
        Drift::InSync
    }
}

/// Compare a local sale count with the remote store's
///
/// # Errors
///
/// Returns [`SyncError::Remote`] if the remote count fails.
pub async fn check_drift(
    local_sales: u64,
    remote: &dyn RemoteStore,
    now: DateTime<Utc>,
) -> Result<DriftReport, SyncError> {
    let remote_sales = remote.count(crate::storage::SALES).await?;
    Ok(report(local_sales, remote_sales, now))
}

fn report(local_sales: u64, remote_sales: u64, now: DateTime<Utc>) -> DriftReport {
    let drift = classify(local_sales, remote_sales);
    match drift {
        Drift::PossibleRemoteReset => {
            tracing::warn!(local_sales, remote_sales, "Remote store is empty: possible reset");
        },
        Drift::SyncNeeded => {
            tracing::info!(local_sales, remote_sales, "Local cache and remote store differ");
        },
        Drift::InSync => {
            tracing::debug!(local_sales, "Local cache and remote store agree");
        },
    }
    DriftReport {
        local_sales,
        remote_sales,
        drift,
        checked_at: now,
    }
}

/// Compare the cached sale count with the remote store's
///
/// # Errors
///
/// Returns [`SyncError::Offline`] without a remote store, or the cache or
/// remote error that prevented counting.
pub async fn check_repository_drift(
    repository: &RaffleRepository,
    now: DateTime<Utc>,
) -> Result<DriftReport, SyncError> {
    let remote_sales = repository.remote_sale_count().await?;
    let local_sales = repository.cached_sale_count().await?;
    Ok(report(local_sales, remote_sales, now))
}

/// Result of a successful force sync
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Fresh data from the remote store
    pub snapshot: RaffleSnapshot,
    /// A default configuration was inserted because the remote had none
    pub reseeded: bool,
    /// Timestamp written to the cache
    pub synced_at: DateTime<Utc>,
}

/// Discard local data in favor of the remote store
///
/// 1. Read every remote collection; any failure aborts with nothing changed.
/// 2. Without a remote configuration, insert one built from `defaults`;
///    a failed insert aborts as well.
/// 3. Clear the local cache and write the fresh snapshot with a new
///    last-sync timestamp.
///
/// The caller replaces its in-memory state with the returned snapshot.
///
/// # Errors
///
/// Returns [`SyncError::Offline`] without a remote store, or the remote
/// error that aborted the sync.
pub async fn force_sync(
    repository: &RaffleRepository,
    defaults: &RaffleDefaults,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, SyncError> {
    let mut snapshot = repository.fetch_remote().await?;

    let reseeded = if snapshot.config.is_none() {
        let config = defaults.to_config(now);
        repository.upsert_remote(&config).await?;
        tracing::info!(raffle = %config.name, "Remote store had no raffle, seeded defaults");
        snapshot.config = Some(config);
        true
    } else {
        false
    };

    if let Err(e) = repository.clear_cache().await {
        tracing::warn!(error = %e, "Could not clear local cache during sync");
    }
    if let Err(e) = repository.write_cache_snapshot(&snapshot, Some(now)).await {
        tracing::warn!(error = %e, "Could not rebuild local cache during sync");
    }

    tracing::info!(
        sales = snapshot.sales.len(),
        reservations = snapshot.reservations.len(),
        assignments = snapshot.assignments.len(),
        reseeded,
        "Force sync complete"
    );

    Ok(SyncOutcome {
        snapshot,
        reseeded,
        synced_at: now,
    })
}
