//! Raffle reducer.
//!
//! Commands are validated against the current state; a rejected command
//! records its [`ValidationError`] as `last_error` and produces no effects.
//! Accepted commands update the state immediately and return persistence
//! effects whose [`PersistOutcome`](crate::storage::PersistOutcome) comes
//! back as [`RaffleAction::Persisted`]. A failed write never reverts the
//! in-memory change.

use crate::config::RaffleDefaults;
use crate::error::{SyncError, ValidationError};
use crate::lifecycle::NumberStatus;
use crate::state::RaffleState;
use crate::storage::{
    CascadeReport, LoadOutcome, LoadSource, PersistReport, RaffleRepository, Record,
};
use crate::sweeper::collect_expired;
use crate::sync::{check_repository_drift, force_sync, DriftReport, SyncOutcome};
use crate::types::{
    ArchivedRaffle, Assignment, AssignmentHolder, AssignmentId, AssignmentStatus, Buyer,
    HolderId, Money, NumberOwner, PaymentMethod, PaymentStatus, RaffleConfig, Reservation,
    ReservationId, ReservationStatus, Sale, SaleId, TicketNumber,
};
use crate::validation::{
    repair_duplicates, validate_buyer, validate_config, validate_data_integrity,
    validate_number_set, validate_numbers_not_sold,
};
use chrono::{DateTime, Utc};
use raffle_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Actions
// ============================================================================

/// Every input of the raffle reducer
#[derive(Clone, Debug)]
pub enum RaffleAction {
    // Commands
    /// Load every collection (remote first, local cache fallback)
    LoadRequested,

    /// Replace the active raffle; the previous one is archived and every
    /// dependent record is deleted
    SetupRaffle {
        /// New configuration
        config: RaffleConfig,
    },

    /// Create a raffle from the configured defaults when none exists
    SeedDefaultConfig,

    /// Delete every sale, reservation, assignment, holder and owner while
    /// keeping the configuration
    ResetRaffle,

    /// Add a number to the operator's picks
    SelectNumber {
        /// Picked number
        number: TicketNumber,
    },

    /// Remove a number from the operator's picks
    DeselectNumber {
        /// Number to drop
        number: TicketNumber,
    },

    /// Drop every pick
    ClearSelection,

    /// Sell numbers to a buyer
    RecordSale {
        /// New sale id
        sale_id: SaleId,
        /// Buyer
        buyer: Buyer,
        /// Numbers sold
        numbers: BTreeSet<TicketNumber>,
        /// Payment method
        payment_method: PaymentMethod,
        /// Paid on the spot
        paid: bool,
    },

    /// Mark a pending sale as paid
    MarkSalePaid {
        /// Sale to update
        sale_id: SaleId,
    },

    /// Delete a sale, freeing its numbers
    DeleteSale {
        /// Sale to delete
        sale_id: SaleId,
    },

    /// Hold available numbers for a buyer
    CreateReservation {
        /// New reservation id
        reservation_id: ReservationId,
        /// Buyer
        buyer: Buyer,
        /// Numbers to hold
        numbers: BTreeSet<TicketNumber>,
    },

    /// Convert an active reservation into a pending sale
    ConfirmReservation {
        /// Reservation to convert
        reservation_id: ReservationId,
        /// Id of the sale to create
        sale_id: SaleId,
        /// Payment method of the sale
        payment_method: PaymentMethod,
    },

    /// Delete a reservation, freeing its numbers
    DeleteReservation {
        /// Reservation to delete
        reservation_id: ReservationId,
    },

    /// Register an intermediary seller
    RegisterHolder {
        /// New holder id
        holder_id: HolderId,
        /// Name
        name: String,
        /// Phone
        phone: String,
    },

    /// Delegate available numbers to a holder
    CreateAssignment {
        /// New assignment id
        assignment_id: AssignmentId,
        /// Holder receiving the numbers
        holder_id: HolderId,
        /// Numbers delegated
        numbers: BTreeSet<TicketNumber>,
        /// Settle-by date
        payment_deadline: DateTime<Utc>,
    },

    /// Move an assignment to a new status
    SetAssignmentStatus {
        /// Assignment to update
        assignment_id: AssignmentId,
        /// Target status
        status: AssignmentStatus,
    },

    /// Record the end buyer of one assigned number
    RecordNumberOwner {
        /// Assignment holding the number
        assignment_id: AssignmentId,
        /// The number
        number: TicketNumber,
        /// End buyer
        buyer: Buyer,
    },

    /// Start the expiry sweeper (no-op while armed)
    ArmSweeper,

    /// Stop the expiry sweeper
    DisarmSweeper,

    /// Expiry sweeper timer fired
    SweepTick {
        /// Timer chain that scheduled this tick
        generation: u64,
    },

    /// Compare cached and remote sale counts
    CheckDrift,

    /// Replace local data with the remote store's
    ForceSync,

    /// Scan sales for numbers sold twice
    CheckIntegrity,

    /// Remove numbers sold twice from every sale but the earliest
    RepairDuplicates,

    // Feedback
    /// Load finished
    Loaded {
        /// Loaded data and where it came from
        outcome: LoadOutcome,
        /// Archived raffles
        archive: Vec<ArchivedRaffle>,
        /// Last force sync
        last_sync: Option<DateTime<Utc>>,
    },

    /// A write or delete finished
    Persisted {
        /// Where it ended up
        report: PersistReport,
    },

    /// A cascade delete finished
    ResetCompleted {
        /// Tables cleared
        report: CascadeReport,
    },

    /// A drift check finished
    DriftChecked {
        /// Report, or why the check could not run
        result: Result<DriftReport, SyncError>,
    },

    /// A force sync finished
    SyncCompleted {
        /// Fresh data, or why the sync aborted
        result: Result<SyncOutcome, SyncError>,
    },

    /// A command was rejected
    ValidationFailed {
        /// Why
        error: ValidationError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the raffle reducer
#[derive(Clone)]
pub struct RaffleEnvironment {
    /// Time source for timestamps, expiry and deadlines
    pub clock: Arc<dyn Clock>,
    /// Persistence adapter
    pub repository: Arc<RaffleRepository>,
    /// Parameters of seeded raffles
    pub defaults: RaffleDefaults,
    /// Expiry sweeper interval
    pub sweep_interval: Duration,
}

impl RaffleEnvironment {
    /// Creates a new `RaffleEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        repository: Arc<RaffleRepository>,
        defaults: RaffleDefaults,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            clock,
            repository,
            defaults,
            sweep_interval,
        }
    }
}

impl std::fmt::Debug for RaffleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaffleEnvironment")
            .field("repository", &self.repository)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

type Effects = SmallVec<[Effect<RaffleAction>; 4]>;

fn save<T: Record + 'static>(repository: &Arc<RaffleRepository>, record: T) -> Effect<RaffleAction> {
    let repository = Arc::clone(repository);
    Effect::future(async move {
        let outcome = repository.save(&record).await;
        Some(RaffleAction::Persisted {
            report: PersistReport::new(T::TABLE, &record.record_id(), outcome),
        })
    })
}

fn delete<T: Record + 'static>(repository: &Arc<RaffleRepository>, id: String) -> Effect<RaffleAction> {
    let repository = Arc::clone(repository);
    Effect::future(async move {
        let outcome = repository.delete::<T>(&id).await;
        Some(RaffleAction::Persisted {
            report: PersistReport::new(T::TABLE, &id, outcome),
        })
    })
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer of the raffle manager
#[derive(Clone, Debug, Default)]
pub struct RaffleReducer;

impl RaffleReducer {
    /// Creates a new `RaffleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut RaffleState, error: ValidationError) -> Effects {
        tracing::debug!(%error, "Command rejected");
        Self::apply_event(state, &RaffleAction::ValidationFailed { error });
        SmallVec::new()
    }

    fn active_config(state: &RaffleState) -> Result<&RaffleConfig, ValidationError> {
        state.config.as_ref().ok_or(ValidationError::NoActiveRaffle)
    }

    /// Numbers must be in range and unsold; reservations and assignments
    /// additionally need them free of other holds
    fn validate_claim(
        state: &RaffleState,
        numbers: &BTreeSet<TicketNumber>,
        require_available: bool,
    ) -> Result<(), ValidationError> {
        let config = Self::active_config(state)?;
        validate_number_set(numbers, config.total_numbers)?;

        let sold = validate_numbers_not_sold(state.sales.values(), numbers);
        if !sold.is_empty() {
            return Err(ValidationError::AlreadySold(sold.into_iter().collect()));
        }

        if require_available {
            let blocked = state.board().unavailable(numbers);
            if !blocked.is_empty() {
                return Err(ValidationError::NotAvailable(blocked));
            }
        }
        Ok(())
    }

    fn validate_sale(
        state: &RaffleState,
        sale_id: SaleId,
        buyer: &Buyer,
        numbers: &BTreeSet<TicketNumber>,
    ) -> Result<(), ValidationError> {
        if state.sales.contains_key(&sale_id) {
            return Err(ValidationError::AlreadyExists {
                kind: "Sale",
                id: sale_id.to_string(),
            });
        }
        validate_buyer(buyer)?;
        Self::validate_claim(state, numbers, false)
    }

    fn validate_confirmation(
        state: &RaffleState,
        reservation_id: ReservationId,
        sale_id: SaleId,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let reservation = state.reservations.get(&reservation_id).ok_or_else(|| {
            ValidationError::NotFound {
                kind: "Reservation",
                id: reservation_id.to_string(),
            }
        })?;

        if reservation.status != ReservationStatus::Active || reservation.is_expired_at(now) {
            let from = if reservation.is_expired_at(now) {
                ReservationStatus::Expired
            } else {
                reservation.status
            };
            return Err(ValidationError::InvalidTransition {
                kind: "Reservation",
                id: reservation_id.to_string(),
                from: from.to_string(),
            });
        }

        if state.sales.contains_key(&sale_id) {
            return Err(ValidationError::AlreadyExists {
                kind: "Sale",
                id: sale_id.to_string(),
            });
        }
        Self::validate_claim(state, &reservation.numbers, false)
    }

    fn validate_assignment(
        state: &RaffleState,
        assignment_id: AssignmentId,
        holder_id: HolderId,
        numbers: &BTreeSet<TicketNumber>,
        payment_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        Self::active_config(state)?;
        if state.assignments.contains_key(&assignment_id) {
            return Err(ValidationError::AlreadyExists {
                kind: "Assignment",
                id: assignment_id.to_string(),
            });
        }
        if !state.holders.contains_key(&holder_id) {
            return Err(ValidationError::NotFound {
                kind: "Holder",
                id: holder_id.to_string(),
            });
        }
        if payment_deadline <= now {
            return Err(ValidationError::DeadlineInPast);
        }
        Self::validate_claim(state, numbers, true)
    }

    fn validate_owner(
        state: &RaffleState,
        assignment_id: AssignmentId,
        number: TicketNumber,
        buyer: &Buyer,
    ) -> Result<(), ValidationError> {
        let assignment = state.assignments.get(&assignment_id).ok_or_else(|| {
            ValidationError::NotFound {
                kind: "Assignment",
                id: assignment_id.to_string(),
            }
        })?;
        if !assignment.status.is_open() {
            return Err(ValidationError::InvalidTransition {
                kind: "Assignment",
                id: assignment_id.to_string(),
                from: assignment.status.to_string(),
            });
        }
        if !assignment.numbers.contains(&number) {
            return Err(ValidationError::NotAvailable(vec![number]));
        }
        validate_buyer(buyer)
    }

    fn validate_selection(state: &RaffleState, number: TicketNumber) -> Result<(), ValidationError> {
        let config = Self::active_config(state)?;
        validate_number_set(&BTreeSet::from([number]), config.total_numbers)?;
        if state.board().status(number) != NumberStatus::Available {
            return Err(ValidationError::NotAvailable(vec![number]));
        }
        Ok(())
    }

    /// Applies a feedback action to state
    fn apply_event(state: &mut RaffleState, action: &RaffleAction) {
        match action {
            RaffleAction::Loaded {
                outcome,
                archive,
                last_sync,
            } => {
                state.replace_records(outcome.snapshot.clone());
                state.archive.clone_from(archive);
                state.last_sync = *last_sync;
                state.load_source = Some(outcome.source.clone());
                state.loaded = true;

                let integrity = validate_data_integrity(state.sales.values());
                if !integrity.is_clean() {
                    tracing::warn!(
                        duplicates = integrity.duplicates.len(),
                        "Numbers sold more than once"
                    );
                }
                state.integrity = Some(integrity);

                tracing::info!(
                    source = ?outcome.source,
                    sales = state.sales.len(),
                    reservations = state.reservations.len(),
                    assignments = state.assignments.len(),
                    "Raffle data loaded"
                );
            },

            RaffleAction::Persisted { report } => {
                if !report.outcome.is_remote() {
                    state.unsynced_writes.push(report.clone());
                }
                state.last_persist = Some(report.clone());
            },

            RaffleAction::ResetCompleted { report } => {
                if let Some((table, reason)) = &report.failed {
                    tracing::warn!(table, reason = %reason, "Cascade delete incomplete");
                }
                state.last_cascade = Some(report.clone());
            },

            RaffleAction::DriftChecked { result } => match result {
                Ok(report) => {
                    state.last_drift = Some(report.clone());
                    state.sync_error = None;
                },
                Err(error) => {
                    tracing::warn!(%error, "Drift check failed");
                    state.sync_error = Some(error.clone());
                },
            },

            RaffleAction::SyncCompleted { result } => match result {
                Ok(outcome) => {
                    state.replace_records(outcome.snapshot.clone());
                    state.archive.clear();
                    state.unsynced_writes.clear();
                    state.last_sync = Some(outcome.synced_at);
                    state.last_drift = None;
                    state.sync_error = None;
                    state.load_source = Some(LoadSource::Remote);
                    state.integrity = Some(validate_data_integrity(state.sales.values()));
                },
                Err(error) => {
                    tracing::warn!(%error, "Force sync aborted, local data kept");
                    state.sync_error = Some(error.clone());
                },
            },

            RaffleAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },

            // Commands are handled in `reduce`
            _ => {},
        }
    }
}

impl Reducer for RaffleReducer {
    type State = RaffleState;
    type Action = RaffleAction;
    type Environment = RaffleEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Loading and raffle lifecycle ==========
            RaffleAction::LoadRequested => {
                let repository = Arc::clone(&env.repository);
                smallvec![Effect::future(async move {
                    let outcome = repository.load().await;
                    let archive = repository.load_archive().await.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Raffle archive unreadable");
                        Vec::new()
                    });
                    let last_sync = repository.last_sync().await.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Last sync timestamp unreadable");
                        None
                    });
                    Some(RaffleAction::Loaded {
                        outcome,
                        archive,
                        last_sync,
                    })
                })]
            },

            RaffleAction::SetupRaffle { config } => {
                if let Err(error) = validate_config(&config) {
                    return Self::reject(state, error);
                }

                let archived = state.archive_entry(env.clock.now());
                if let Some(entry) = &archived {
                    state.archive.push(entry.clone());
                }
                state.clear_records();
                state.config = Some(config.clone());
                state.last_error = None;
                tracing::info!(
                    raffle = %config.name,
                    total_numbers = config.total_numbers,
                    archived = archived.is_some(),
                    "Raffle configured"
                );

                let repository = Arc::clone(&env.repository);
                let cascade = Effect::future(async move {
                    if let Some(entry) = archived {
                        if let Err(e) = repository.append_archive(&entry).await {
                            tracing::warn!(error = %e, "Could not archive previous raffle");
                        }
                    }
                    let report = repository.reset_cascade(true).await;
                    Some(RaffleAction::ResetCompleted { report })
                });

                smallvec![Effect::chain(vec![cascade, save(&env.repository, config)])]
            },

            RaffleAction::SeedDefaultConfig => {
                if state.config.is_some() {
                    return SmallVec::new();
                }
                let config = env.defaults.to_config(env.clock.now());
                if let Err(error) = validate_config(&config) {
                    return Self::reject(state, error);
                }
                tracing::info!(raffle = %config.name, "Seeded default raffle");
                state.config = Some(config.clone());
                smallvec![save(&env.repository, config)]
            },

            RaffleAction::ResetRaffle => {
                if let Err(error) = Self::active_config(state) {
                    return Self::reject(state, error);
                }
                state.clear_records();
                state.last_error = None;

                let repository = Arc::clone(&env.repository);
                smallvec![Effect::future(async move {
                    let report = repository.reset_cascade(false).await;
                    Some(RaffleAction::ResetCompleted { report })
                })]
            },

            // ========== Selection ==========
            RaffleAction::SelectNumber { number } => {
                if state.selected.contains(&number) {
                    return SmallVec::new();
                }
                if let Err(error) = Self::validate_selection(state, number) {
                    return Self::reject(state, error);
                }
                state.selected.insert(number);
                SmallVec::new()
            },

            RaffleAction::DeselectNumber { number } => {
                state.selected.remove(&number);
                SmallVec::new()
            },

            RaffleAction::ClearSelection => {
                state.selected.clear();
                SmallVec::new()
            },

            // ========== Sales ==========
            RaffleAction::RecordSale {
                sale_id,
                buyer,
                numbers,
                payment_method,
                paid,
            } => {
                if let Err(error) = Self::validate_sale(state, sale_id, &buyer, &numbers) {
                    return Self::reject(state, error);
                }

                let now = env.clock.now();
                let price = state
                    .config
                    .as_ref()
                    .map_or(Money::ZERO, |c| c.price_per_number);
                let sale = Sale {
                    id: sale_id,
                    buyer,
                    total: price.times(numbers.len()),
                    numbers,
                    payment_status: if paid {
                        PaymentStatus::Paid
                    } else {
                        PaymentStatus::Pending
                    },
                    payment_method,
                    created_at: now,
                    paid_at: paid.then_some(now),
                };
                state.sales.insert(sale_id, sale.clone());
                state.prune_selection();
                state.last_error = None;

                metrics::counter!("raffle.sales.recorded").increment(1);
                tracing::info!(
                    sale_id = %sale_id,
                    numbers = sale.numbers.len(),
                    total = %sale.total,
                    paid,
                    "Sale recorded"
                );
                smallvec![save(&env.repository, sale)]
            },

            RaffleAction::MarkSalePaid { sale_id } => {
                let now = env.clock.now();
                let Some(sale) = state.sales.get_mut(&sale_id) else {
                    return Self::reject(
                        state,
                        ValidationError::NotFound {
                            kind: "Sale",
                            id: sale_id.to_string(),
                        },
                    );
                };
                if sale.is_paid() {
                    return Self::reject(
                        state,
                        ValidationError::InvalidTransition {
                            kind: "Sale",
                            id: sale_id.to_string(),
                            from: "paid".to_string(),
                        },
                    );
                }
                sale.payment_status = PaymentStatus::Paid;
                sale.paid_at = Some(now);
                let sale = sale.clone();
                state.last_error = None;
                smallvec![save(&env.repository, sale)]
            },

            RaffleAction::DeleteSale { sale_id } => {
                if state.sales.remove(&sale_id).is_none() {
                    return Self::reject(
                        state,
                        ValidationError::NotFound {
                            kind: "Sale",
                            id: sale_id.to_string(),
                        },
                    );
                }
                state.last_error = None;
                tracing::info!(sale_id = %sale_id, "Sale deleted");
                smallvec![delete::<Sale>(&env.repository, sale_id.to_string())]
            },

            // ========== Reservations ==========
            RaffleAction::CreateReservation {
                reservation_id,
                buyer,
                numbers,
            } => {
                if state.reservations.contains_key(&reservation_id) {
                    return Self::reject(
                        state,
                        ValidationError::AlreadyExists {
                            kind: "Reservation",
                            id: reservation_id.to_string(),
                        },
                    );
                }
                if let Err(error) = validate_buyer(&buyer)
                    .and_then(|()| Self::validate_claim(state, &numbers, true))
                {
                    return Self::reject(state, error);
                }

                let now = env.clock.now();
                let hold = state
                    .config
                    .as_ref()
                    .map_or_else(chrono::Duration::zero, RaffleConfig::hold);
                let reservation = Reservation {
                    id: reservation_id,
                    buyer,
                    numbers,
                    created_at: now,
                    expires_at: now + hold,
                    status: ReservationStatus::Active,
                };
                state.reservations.insert(reservation_id, reservation.clone());
                state.prune_selection();
                state.last_error = None;

                tracing::info!(
                    reservation_id = %reservation_id,
                    numbers = reservation.numbers.len(),
                    expires_at = %reservation.expires_at,
                    "Reservation created"
                );
                smallvec![save(&env.repository, reservation)]
            },

            RaffleAction::ConfirmReservation {
                reservation_id,
                sale_id,
                payment_method,
            } => {
                let now = env.clock.now();
                if let Err(error) =
                    Self::validate_confirmation(state, reservation_id, sale_id, now)
                {
                    return Self::reject(state, error);
                }
                let price = state
                    .config
                    .as_ref()
                    .map_or(Money::ZERO, |c| c.price_per_number);
                let Some(reservation) = state.reservations.get_mut(&reservation_id) else {
                    return SmallVec::new();
                };

                reservation.status = ReservationStatus::Confirmed;
                let reservation = reservation.clone();
                let sale = Sale {
                    id: sale_id,
                    buyer: reservation.buyer.clone(),
                    total: price.times(reservation.numbers.len()),
                    numbers: reservation.numbers.clone(),
                    payment_status: PaymentStatus::Pending,
                    payment_method,
                    created_at: now,
                    paid_at: None,
                };
                state.sales.insert(sale_id, sale.clone());
                state.last_error = None;

                metrics::counter!("raffle.sales.recorded").increment(1);
                tracing::info!(
                    reservation_id = %reservation_id,
                    sale_id = %sale_id,
                    "Reservation converted into a sale"
                );
                smallvec![
                    save(&env.repository, sale),
                    save(&env.repository, reservation)
                ]
            },

            RaffleAction::DeleteReservation { reservation_id } => {
                if state.reservations.remove(&reservation_id).is_none() {
                    return Self::reject(
                        state,
                        ValidationError::NotFound {
                            kind: "Reservation",
                            id: reservation_id.to_string(),
                        },
                    );
                }
                state.last_error = None;
                smallvec![delete::<Reservation>(
                    &env.repository,
                    reservation_id.to_string()
                )]
            },

            // ========== Assignments ==========
            RaffleAction::RegisterHolder {
                holder_id,
                name,
                phone,
            } => {
                let error = if state.holders.contains_key(&holder_id) {
                    Some(ValidationError::AlreadyExists {
                        kind: "Holder",
                        id: holder_id.to_string(),
                    })
                } else if name.trim().is_empty() {
                    Some(ValidationError::MissingField("Holder name"))
                } else if phone.trim().is_empty() {
                    Some(ValidationError::MissingField("Holder phone"))
                } else {
                    None
                };
                if let Some(error) = error {
                    return Self::reject(state, error);
                }

                let holder = AssignmentHolder {
                    id: holder_id,
                    name,
                    phone,
                };
                state.holders.insert(holder_id, holder.clone());
                state.last_error = None;
                smallvec![save(&env.repository, holder)]
            },

            RaffleAction::CreateAssignment {
                assignment_id,
                holder_id,
                numbers,
                payment_deadline,
            } => {
                let now = env.clock.now();
                if let Err(error) = Self::validate_assignment(
                    state,
                    assignment_id,
                    holder_id,
                    &numbers,
                    payment_deadline,
                    now,
                ) {
                    return Self::reject(state, error);
                }

                let assignment = Assignment {
                    id: assignment_id,
                    holder_id,
                    numbers,
                    payment_deadline,
                    created_at: now,
                    status: AssignmentStatus::Assigned,
                };
                state.assignments.insert(assignment_id, assignment.clone());
                state.prune_selection();
                state.last_error = None;

                tracing::info!(
                    assignment_id = %assignment_id,
                    holder_id = %holder_id,
                    numbers = assignment.numbers.len(),
                    "Numbers assigned"
                );
                smallvec![save(&env.repository, assignment)]
            },

            RaffleAction::SetAssignmentStatus {
                assignment_id,
                status,
            } => {
                let Some(assignment) = state.assignments.get_mut(&assignment_id) else {
                    return Self::reject(
                        state,
                        ValidationError::NotFound {
                            kind: "Assignment",
                            id: assignment_id.to_string(),
                        },
                    );
                };
                if !assignment.status.can_become(status) {
                    let from = assignment.status.to_string();
                    return Self::reject(
                        state,
                        ValidationError::InvalidTransition {
                            kind: "Assignment",
                            id: assignment_id.to_string(),
                            from,
                        },
                    );
                }
                assignment.status = status;
                let assignment = assignment.clone();
                state.last_error = None;
                smallvec![save(&env.repository, assignment)]
            },

            RaffleAction::RecordNumberOwner {
                assignment_id,
                number,
                buyer,
            } => {
                if let Err(error) = Self::validate_owner(state, assignment_id, number, &buyer) {
                    return Self::reject(state, error);
                }
                let owner = NumberOwner {
                    number,
                    assignment_id,
                    buyer,
                };
                state.owners.insert((assignment_id, number), owner.clone());
                state.last_error = None;
                smallvec![save(&env.repository, owner)]
            },

            // ========== Expiry sweeper ==========
            RaffleAction::ArmSweeper => {
                if state.sweeper.armed {
                    tracing::debug!("Sweeper already armed");
                    return SmallVec::new();
                }
                state.sweeper.armed = true;
                state.sweeper.generation += 1;
                tracing::debug!(
                    generation = state.sweeper.generation,
                    interval = ?env.sweep_interval,
                    "Sweeper armed"
                );
                smallvec![Effect::Delay {
                    duration: env.sweep_interval,
                    action: Box::new(RaffleAction::SweepTick {
                        generation: state.sweeper.generation,
                    }),
                }]
            },

            RaffleAction::DisarmSweeper => {
                if state.sweeper.armed {
                    state.sweeper.armed = false;
                    state.sweeper.generation += 1;
                    tracing::debug!("Sweeper disarmed");
                }
                SmallVec::new()
            },

            RaffleAction::SweepTick { generation } => {
                if !state.sweeper.armed || generation != state.sweeper.generation {
                    tracing::trace!(
                        generation,
                        current = state.sweeper.generation,
                        "Ignoring stale sweep tick"
                    );
                    return SmallVec::new();
                }

                let now = env.clock.now();
                let plan = collect_expired(state.reservations.values(), state.assignments.values(), now);
                let mut effects = Effects::new();

                for id in &plan.reservations {
                    if let Some(reservation) = state.reservations.get_mut(id) {
                        reservation.status = ReservationStatus::Expired;
                        effects.push(save(&env.repository, reservation.clone()));
                    }
                }
                for id in &plan.assignments {
                    if let Some(assignment) = state.assignments.get_mut(id) {
                        assignment.status = AssignmentStatus::Expired;
                        effects.push(save(&env.repository, assignment.clone()));
                    }
                }

                if !plan.is_empty() {
                    let expired = plan.reservations.len() + plan.assignments.len();
                    metrics::counter!("raffle.sweeper.expired").increment(expired as u64);
                    tracing::info!(
                        reservations = plan.reservations.len(),
                        assignments = plan.assignments.len(),
                        "Expired overdue holds"
                    );
                }

                effects.push(Effect::Delay {
                    duration: env.sweep_interval,
                    action: Box::new(RaffleAction::SweepTick { generation }),
                });
                effects
            },

            // ========== Reconciliation ==========
            RaffleAction::CheckDrift => {
                let repository = Arc::clone(&env.repository);
                let now = env.clock.now();
                smallvec![Effect::future(async move {
                    let result = check_repository_drift(&repository, now).await;
                    Some(RaffleAction::DriftChecked { result })
                })]
            },

            RaffleAction::ForceSync => {
                let repository = Arc::clone(&env.repository);
                let defaults = env.defaults.clone();
                let now = env.clock.now();
                smallvec![Effect::future(async move {
                    let result = force_sync(&repository, &defaults, now).await;
                    Some(RaffleAction::SyncCompleted { result })
                })]
            },

            // ========== Integrity ==========
            RaffleAction::CheckIntegrity => {
                let report = validate_data_integrity(state.sales.values());
                if report.is_clean() {
                    tracing::debug!("No duplicate numbers");
                } else {
                    tracing::warn!(
                        numbers = ?report.duplicates.keys().collect::<Vec<_>>(),
                        "Numbers sold more than once"
                    );
                }
                state.integrity = Some(report);
                SmallVec::new()
            },

            RaffleAction::RepairDuplicates => {
                let price = match Self::active_config(state) {
                    Ok(config) => config.price_per_number,
                    Err(error) => return Self::reject(state, error),
                };
                let sales: Vec<Sale> = state.sales.values().cloned().collect();
                let plan = repair_duplicates(&sales, price);
                let mut effects = Effects::new();

                for sale in plan.updated {
                    tracing::info!(sale_id = %sale.id, total = %sale.total, "Trimmed duplicated numbers");
                    state.sales.insert(sale.id, sale.clone());
                    effects.push(save(&env.repository, sale));
                }
                for sale_id in plan.deleted {
                    tracing::info!(sale_id = %sale_id, "Deleted sale left without numbers");
                    state.sales.remove(&sale_id);
                    effects.push(delete::<Sale>(&env.repository, sale_id.to_string()));
                }

                state.integrity = Some(validate_data_integrity(state.sales.values()));
                effects
            },

            // ========== Feedback ==========
            RaffleAction::Loaded { .. }
            | RaffleAction::Persisted { .. }
            | RaffleAction::ResetCompleted { .. }
            | RaffleAction::DriftChecked { .. }
            | RaffleAction::SyncCompleted { .. }
            | RaffleAction::ValidationFailed { .. } => {
                Self::apply_event(state, &action);
                SmallVec::new()
            },
        }
    }
}
