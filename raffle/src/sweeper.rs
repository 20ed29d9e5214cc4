//! Reservation expiry sweeper.
//!
//! The timer itself lives in the reducer (`ArmSweeper` / `SweepTick` with a
//! generation counter). This module only decides what a tick expires.

use crate::types::{Assignment, AssignmentId, Reservation, ReservationId};
use chrono::{DateTime, Utc};

/// Records a sweep tick moves to `expired`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Active reservations past `expires_at`
    pub reservations: Vec<ReservationId>,
    /// Assigned assignments past their payment deadline
    pub assignments: Vec<AssignmentId>,
}

impl SweepPlan {
    /// Nothing to expire
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty() && self.assignments.is_empty()
    }
}

/// Collect what expires at `now`
#[must_use]
pub fn collect_expired<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    assignments: impl IntoIterator<Item = &'a Assignment>,
    now: DateTime<Utc>,
) -> SweepPlan {
    let mut plan = SweepPlan {
        reservations: reservations
            .into_iter()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.id)
            .collect(),
        assignments: assignments
            .into_iter()
            .filter(|a| a.is_overdue_at(now))
            .map(|a| a.id)
            .collect(),
    };
    plan.reservations.sort();
    plan.assignments.sort();
    plan
}
