//! Owned application state of the raffle manager.

use crate::error::{SyncError, ValidationError};
use crate::lifecycle::{NumberBoard, NumberStatus, MAX_TOTAL_NUMBERS};
use crate::report::RaffleStats;
use crate::storage::{CascadeReport, LoadSource, PersistReport};
use crate::sync::DriftReport;
use crate::types::{
    ArchivedRaffle, Assignment, AssignmentHolder, AssignmentId, HolderId, NumberOwner,
    RaffleConfig, RaffleSnapshot, Reservation, ReservationId, Sale, SaleId, TicketNumber,
};
use crate::validation::IntegrityReport;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Expiry sweeper timer chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweeperState {
    /// A timer chain is running
    pub armed: bool,
    /// Identifies the current chain; ticks carrying another value are stale
    pub generation: u64,
}

/// Everything the raffle manager knows about the active raffle
#[derive(Clone, Debug, Default)]
pub struct RaffleState {
    /// Active configuration
    pub config: Option<RaffleConfig>,
    /// Sales by id
    pub sales: BTreeMap<SaleId, Sale>,
    /// Reservations by id
    pub reservations: BTreeMap<ReservationId, Reservation>,
    /// Assignments by id
    pub assignments: BTreeMap<AssignmentId, Assignment>,
    /// Intermediary sellers by id
    pub holders: BTreeMap<HolderId, AssignmentHolder>,
    /// End buyers of assigned numbers
    pub owners: BTreeMap<(AssignmentId, TicketNumber), NumberOwner>,
    /// Summaries of replaced raffles, oldest first
    pub archive: Vec<ArchivedRaffle>,
    /// Operator's current picks (never persisted)
    pub selected: BTreeSet<TicketNumber>,

    /// Initial load finished
    pub loaded: bool,
    /// Where the last full load came from
    pub load_source: Option<LoadSource>,
    /// Last rejected command
    pub last_error: Option<ValidationError>,
    /// Last write attempt
    pub last_persist: Option<PersistReport>,
    /// Writes that did not reach the remote store
    pub unsynced_writes: Vec<PersistReport>,
    /// Last cascade delete
    pub last_cascade: Option<CascadeReport>,
    /// Last drift check
    pub last_drift: Option<DriftReport>,
    /// Last failed drift check or force sync
    pub sync_error: Option<SyncError>,
    /// Last successful force sync
    pub last_sync: Option<DateTime<Utc>>,
    /// Last duplicate scan
    pub integrity: Option<IntegrityReport>,
    /// Expiry sweeper
    pub sweeper: SweeperState,
}

impl RaffleState {
    /// Empty state, nothing loaded yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State holding the records of `snapshot`
    #[must_use]
    pub fn from_snapshot(snapshot: RaffleSnapshot) -> Self {
        let mut state = Self::new();
        state.replace_records(snapshot);
        state
    }

    /// Replace every persisted collection with `snapshot`
    ///
    /// The selection is dropped; timers and diagnostics are kept.
    pub fn replace_records(&mut self, snapshot: RaffleSnapshot) {
        self.config = snapshot.config;
        self.sales = snapshot.sales.into_iter().map(|s| (s.id, s)).collect();
        self.reservations = snapshot
            .reservations
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        self.assignments = snapshot
            .assignments
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        self.holders = snapshot.holders.into_iter().map(|h| (h.id, h)).collect();
        self.owners = snapshot
            .owners
            .into_iter()
            .map(|o| ((o.assignment_id, o.number), o))
            .collect();
        self.selected.clear();
    }

    /// Remove every record that depends on the configuration
    pub fn clear_records(&mut self) {
        self.sales.clear();
        self.reservations.clear();
        self.assignments.clear();
        self.holders.clear();
        self.owners.clear();
        self.selected.clear();
        self.integrity = None;
    }

    /// Copy of every persisted collection
    #[must_use]
    pub fn snapshot(&self) -> RaffleSnapshot {
        RaffleSnapshot {
            config: self.config.clone(),
            sales: self.sales.values().cloned().collect(),
            reservations: self.reservations.values().cloned().collect(),
            assignments: self.assignments.values().cloned().collect(),
            holders: self.holders.values().cloned().collect(),
            owners: self.owners.values().cloned().collect(),
        }
    }

    /// Numbers on sale (zero without a configuration, capped at [`MAX_TOTAL_NUMBERS`])
    #[must_use]
    pub fn total_numbers(&self) -> u32 {
        self.config
            .as_ref()
            .map_or(0, |c| c.total_numbers.min(MAX_TOTAL_NUMBERS))
    }

    /// Derived status of every number, without the selection overlay
    #[must_use]
    pub fn board(&self) -> NumberBoard {
        NumberBoard::derive(
            self.total_numbers(),
            self.sales.values(),
            self.assignments.values(),
            self.reservations.values(),
        )
    }

    /// Derived status of every number, selection included
    #[must_use]
    pub fn board_with_selection(&self) -> NumberBoard {
        self.board().with_selection(&self.selected)
    }

    /// Display status of one number
    #[must_use]
    pub fn number_status(&self, number: TicketNumber) -> NumberStatus {
        self.board_with_selection().status(number)
    }

    /// Counts and revenue
    #[must_use]
    pub fn stats(&self) -> RaffleStats {
        RaffleStats::compute(&self.board(), self.sales.values())
    }

    /// Drop picks that are no longer available
    pub fn prune_selection(&mut self) {
        if self.selected.is_empty() {
            return;
        }
        let board = self.board();
        self.selected
            .retain(|n| board.status(*n) == NumberStatus::Available);
    }

    /// Summary of the active raffle for the archive
    #[must_use]
    pub fn archive_entry(&self, now: DateTime<Utc>) -> Option<ArchivedRaffle> {
        let config = self.config.clone()?;
        let stats = self.stats();
        Some(ArchivedRaffle {
            config,
            sale_count: stats.sale_count,
            sold_numbers: stats.sold,
            paid_revenue: stats.paid_revenue,
            pending_revenue: stats.pending_revenue,
            archived_at: now,
        })
    }
}
