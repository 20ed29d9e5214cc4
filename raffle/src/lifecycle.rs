//! Number lifecycle engine.
//!
//! Derives one display status per ticket number from the persisted sales,
//! assignments and reservations. Precedence, strongest first:
//!
//! 1. `Sold`: the number appears in any sale
//! 2. `Confirmed`: an assignment holding it is `confirmed` or `paid`
//! 3. `Assigned`: an assignment holding it is `assigned`
//! 4. `Reserved`: an `active` reservation holds it
//! 5. `Available`
//!
//! `Selected` is an overlay for the operator's current picks and only
//! replaces `Available`. Derivation is pure and never fails; numbers outside
//! the raffle range are ignored on input and read back as `Available`.

use crate::types::{Assignment, AssignmentStatus, Reservation, ReservationStatus, Sale, TicketNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Largest raffle the engine will derive a board for
pub const MAX_TOTAL_NUMBERS: u32 = 1_000_000;

/// Display status of one number
///
/// Variants are ordered by precedence, so combining two claims on a number
/// is `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberStatus {
    /// Free to sell
    Available,
    /// Picked by the operator, not persisted
    Selected,
    /// Held by an active reservation
    Reserved,
    /// Delegated to an intermediary
    Assigned,
    /// Delegated and confirmed or paid by the intermediary
    Confirmed,
    /// Part of a sale
    Sold,
}

/// Count of numbers per status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Available numbers
    pub available: usize,
    /// Selected numbers
    pub selected: usize,
    /// Reserved numbers
    pub reserved: usize,
    /// Assigned numbers
    pub assigned: usize,
    /// Confirmed numbers
    pub confirmed: usize,
    /// Sold numbers
    pub sold: usize,
}

/// Derived status of every number of the raffle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberBoard {
    statuses: Vec<NumberStatus>,
}

impl NumberBoard {
    /// Derive the board for `total_numbers` numbers
    #[must_use]
    pub fn derive<'a>(
        total_numbers: u32,
        sales: impl IntoIterator<Item = &'a Sale>,
        assignments: impl IntoIterator<Item = &'a Assignment>,
        reservations: impl IntoIterator<Item = &'a Reservation>,
    ) -> Self {
        let mut board = Self {
            statuses: vec![NumberStatus::Available; total_numbers.min(MAX_TOTAL_NUMBERS) as usize],
        };

        for reservation in reservations {
            if reservation.status == ReservationStatus::Active {
                board.raise(&reservation.numbers, NumberStatus::Reserved);
            }
        }

        for assignment in assignments {
            let status = match assignment.status {
                AssignmentStatus::Assigned => NumberStatus::Assigned,
                AssignmentStatus::Confirmed | AssignmentStatus::Paid => NumberStatus::Confirmed,
                AssignmentStatus::Expired | AssignmentStatus::Cancelled => continue,
            };
            board.raise(&assignment.numbers, status);
        }

        for sale in sales {
            board.raise(&sale.numbers, NumberStatus::Sold);
        }

        board
    }

    fn raise(&mut self, numbers: &BTreeSet<TicketNumber>, status: NumberStatus) {
        for number in numbers {
            if let Some(slot) = self.statuses.get_mut(number.value() as usize) {
                *slot = (*slot).max(status);
            }
        }
    }

    /// Overlay the operator's picks onto available numbers
    #[must_use]
    pub fn with_selection(mut self, selected: &BTreeSet<TicketNumber>) -> Self {
        for number in selected {
            if let Some(slot) = self.statuses.get_mut(number.value() as usize) {
                if *slot == NumberStatus::Available {
                    *slot = NumberStatus::Selected;
                }
            }
        }
        self
    }

    /// Status of one number (`Available` when out of range)
    #[must_use]
    pub fn status(&self, number: TicketNumber) -> NumberStatus {
        self.statuses
            .get(number.value() as usize)
            .copied()
            .unwrap_or(NumberStatus::Available)
    }

    /// Number of numbers on the board
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Whether the board has no numbers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Every number with its status, ascending
    pub fn iter(&self) -> impl Iterator<Item = (TicketNumber, NumberStatus)> + '_ {
        (0_u32..)
            .zip(self.statuses.iter())
            .map(|(n, status)| (TicketNumber::new(n), *status))
    }

    /// Numbers currently available, ascending
    #[must_use]
    pub fn available(&self) -> Vec<TicketNumber> {
        self.iter()
            .filter(|(_, status)| *status == NumberStatus::Available)
            .map(|(number, _)| number)
            .collect()
    }

    /// Numbers among `candidates` that are not available
    #[must_use]
    pub fn unavailable<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a TicketNumber>,
    ) -> Vec<TicketNumber> {
        candidates
            .into_iter()
            .filter(|n| !matches!(self.status(**n), NumberStatus::Available | NumberStatus::Selected))
            .copied()
            .collect()
    }

    /// Count of numbers per status
    #[must_use]
    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for status in &self.statuses {
            match status {
                NumberStatus::Available => summary.available += 1,
                NumberStatus::Selected => summary.selected += 1,
                NumberStatus::Reserved => summary.reserved += 1,
                NumberStatus::Assigned => summary.assigned += 1,
                NumberStatus::Confirmed => summary.confirmed += 1,
                NumberStatus::Sold => summary.sold += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        numbers, AssignmentId, Buyer, HolderId, Money, PaymentMethod, PaymentStatus,
        ReservationId, SaleId,
    };
    use chrono::Utc;

    fn sale(values: &[u32]) -> Sale {
        Sale {
            id: SaleId::new(),
            buyer: Buyer::new("Ana", "555-0100"),
            numbers: numbers(values.iter().copied()),
            total: Money::from_cents(1_000),
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cash,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    fn reservation(values: &[u32], status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: ReservationId::new(),
            buyer: Buyer::new("Luis", "555-0101"),
            numbers: numbers(values.iter().copied()),
            created_at: now,
            expires_at: now,
            status,
        }
    }

    fn assignment(values: &[u32], status: AssignmentStatus) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: AssignmentId::new(),
            holder_id: HolderId::new(),
            numbers: numbers(values.iter().copied()),
            payment_deadline: now,
            created_at: now,
            status,
        }
    }

    #[test]
    fn test_precedence() {
        let sales = [sale(&[1])];
        let assignments = [
            assignment(&[1, 2, 3], AssignmentStatus::Assigned),
            assignment(&[3], AssignmentStatus::Paid),
            assignment(&[6], AssignmentStatus::Cancelled),
        ];
        let reservations = [
            reservation(&[1, 2, 4], ReservationStatus::Active),
            reservation(&[5], ReservationStatus::Expired),
        ];

        let board = NumberBoard::derive(8, &sales, &assignments, &reservations);

        assert_eq!(board.status(TicketNumber::new(0)), NumberStatus::Available);
        assert_eq!(board.status(TicketNumber::new(1)), NumberStatus::Sold);
        assert_eq!(board.status(TicketNumber::new(2)), NumberStatus::Assigned);
        assert_eq!(board.status(TicketNumber::new(3)), NumberStatus::Confirmed);
        assert_eq!(board.status(TicketNumber::new(4)), NumberStatus::Reserved);
        assert_eq!(board.status(TicketNumber::new(5)), NumberStatus::Available);
        assert_eq!(board.status(TicketNumber::new(6)), NumberStatus::Available);
    }

    #[test]
    fn test_out_of_range_numbers_are_ignored() {
        let sales = [sale(&[2, 50])];
        let board = NumberBoard::derive(3, &sales, &[], &[]);

        assert_eq!(board.len(), 3);
        assert_eq!(board.status(TicketNumber::new(50)), NumberStatus::Available);
        assert_eq!(board.summary().sold, 1);
    }

    #[test]
    fn test_board_size_is_capped() {
        let board = NumberBoard::derive(u32::MAX, &[], &[], &[]);
        assert_eq!(board.len(), MAX_TOTAL_NUMBERS as usize);
    }

    #[test]
    fn test_selection_only_overlays_available_numbers() {
        let sales = [sale(&[1])];
        let selected = numbers([0, 1, 9]);

        let board = NumberBoard::derive(3, &sales, &[], &[]).with_selection(&selected);

        assert_eq!(board.status(TicketNumber::new(0)), NumberStatus::Selected);
        assert_eq!(board.status(TicketNumber::new(1)), NumberStatus::Sold);
        assert_eq!(board.available(), vec![TicketNumber::new(2)]);
    }

    #[test]
    fn test_summary_and_unavailable() {
        let reservations = [reservation(&[0], ReservationStatus::Active)];
        let board = NumberBoard::derive(4, &[], &[], &reservations);

        assert_eq!(
            board.summary(),
            StatusSummary {
                available: 3,
                reserved: 1,
                ..StatusSummary::default()
            }
        );
        assert_eq!(
            board.unavailable(&numbers([0, 1])),
            vec![TicketNumber::new(0)]
        );
    }
}
