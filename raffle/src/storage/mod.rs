//! Persistence adapter.
//!
//! Every collection is written to the remote store first and mirrored into
//! the local cache; when the remote store fails or is not configured the
//! cache alone carries the write. Callers get an explicit [`PersistOutcome`]
//! instead of a silent fallback.

mod local;
mod repository;

pub use local::FileCache;
pub use repository::{CascadeReport, LoadOutcome, LoadSource, RaffleRepository};

use crate::types::{Assignment, AssignmentHolder, NumberOwner, RaffleConfig, Reservation, Sale};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Remote table / cache key of the raffle configuration
pub const RAFFLE_CONFIG: &str = "raffle_config";
/// Remote table / cache key of sales
pub const SALES: &str = "sales";
/// Remote table / cache key of reservations
pub const RESERVATIONS: &str = "reservations";
/// Remote table / cache key of assignments
pub const ASSIGNMENTS: &str = "assignments";
/// Remote table / cache key of assignment holders
pub const ASSIGNMENT_HOLDERS: &str = "assignment_holders";
/// Remote table / cache key of number owners
pub const NUMBER_OWNERS: &str = "number_owners";
/// Cache key of archived raffles (never stored remotely)
pub const RAFFLE_ARCHIVE: &str = "raffle_archive";
/// Cache key of the last force-sync timestamp
pub const LAST_SYNC: &str = "last_sync";

/// Every remote table
pub const REMOTE_TABLES: [&str; 6] = [
    RAFFLE_CONFIG,
    SALES,
    RESERVATIONS,
    ASSIGNMENTS,
    ASSIGNMENT_HOLDERS,
    NUMBER_OWNERS,
];

/// Cascade delete order: dependents first, configuration last
pub const CASCADE_ORDER: [&str; 6] = [
    NUMBER_OWNERS,
    ASSIGNMENTS,
    ASSIGNMENT_HOLDERS,
    RESERVATIONS,
    SALES,
    RAFFLE_CONFIG,
];

/// A persisted entity: one row of a remote table, one entry of a cache
/// collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Remote table and cache key
    const TABLE: &'static str;

    /// Row identifier
    fn record_id(&self) -> String;
}

impl Record for RaffleConfig {
    const TABLE: &'static str = RAFFLE_CONFIG;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Sale {
    const TABLE: &'static str = SALES;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Reservation {
    const TABLE: &'static str = RESERVATIONS;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Assignment {
    const TABLE: &'static str = ASSIGNMENTS;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for AssignmentHolder {
    const TABLE: &'static str = ASSIGNMENT_HOLDERS;

    fn record_id(&self) -> String {
        self.id.to_string()
    }
}

impl Record for NumberOwner {
    const TABLE: &'static str = NUMBER_OWNERS;

    fn record_id(&self) -> String {
        format!("{}-{}", self.assignment_id, self.number)
    }
}

/// Where a write ended up
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistOutcome {
    /// Stored remotely (and mirrored locally)
    Remote,
    /// Remote store failed or is offline; stored in the local cache only
    LocalFallback {
        /// Why the remote write did not happen
        reason: String,
    },
    /// Neither store accepted the write
    Failed {
        /// What went wrong
        reason: String,
    },
}

impl PersistOutcome {
    /// Stored remotely
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote)
    }

    /// Stored only in the local cache
    #[must_use]
    pub const fn is_local_fallback(&self) -> bool {
        matches!(self, Self::LocalFallback { .. })
    }

    /// Lost
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One write attempt and where it ended up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistReport {
    /// `table/id` of the record
    pub target: String,
    /// Result of the write
    pub outcome: PersistOutcome,
}

impl PersistReport {
    /// Report for a record write or delete
    #[must_use]
    pub fn new(table: &str, id: &str, outcome: PersistOutcome) -> Self {
        Self {
            target: format!("{table}/{id}"),
            outcome,
        }
    }
}
