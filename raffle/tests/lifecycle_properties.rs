//! Property tests for the number lifecycle and validation layer.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use raffle::lifecycle::{NumberBoard, NumberStatus};
use raffle::types::{
    Assignment, AssignmentId, AssignmentStatus, Buyer, HolderId, Money, PaymentMethod,
    PaymentStatus, Reservation, ReservationId, ReservationStatus, Sale, SaleId, TicketNumber,
};
use raffle::validation::{repair_duplicates, validate_data_integrity, validate_numbers_not_sold};
use std::collections::BTreeSet;

const TOTAL: u32 = 40;

fn number_set() -> impl Strategy<Value = BTreeSet<TicketNumber>> {
    prop::collection::btree_set((0..TOTAL).prop_map(TicketNumber::new), 1..8)
}

fn sale(numbers: BTreeSet<TicketNumber>, minute: i64) -> Sale {
    Sale {
        id: SaleId::new(),
        buyer: Buyer::new("Ana", "555-0100"),
        total: Money::from_cents(500).times(numbers.len()),
        numbers,
        payment_status: PaymentStatus::Pending,
        payment_method: PaymentMethod::Cash,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
        paid_at: None,
    }
}

fn reservation(numbers: BTreeSet<TicketNumber>, active: bool) -> Reservation {
    let now = Utc::now();
    Reservation {
        id: ReservationId::new(),
        buyer: Buyer::new("Luis", "555-0101"),
        numbers,
        created_at: now,
        expires_at: now + Duration::hours(1),
        status: if active {
            ReservationStatus::Active
        } else {
            ReservationStatus::Expired
        },
    }
}

fn assignment(numbers: BTreeSet<TicketNumber>, status: AssignmentStatus) -> Assignment {
    let now = Utc::now();
    Assignment {
        id: AssignmentId::new(),
        holder_id: HolderId::new(),
        numbers,
        payment_deadline: now + Duration::days(1),
        created_at: now,
        status,
    }
}

fn assignment_status() -> impl Strategy<Value = AssignmentStatus> {
    prop_oneof![
        Just(AssignmentStatus::Assigned),
        Just(AssignmentStatus::Confirmed),
        Just(AssignmentStatus::Paid),
        Just(AssignmentStatus::Expired),
        Just(AssignmentStatus::Cancelled),
    ]
}

proptest! {
    #[test]
    fn sold_numbers_are_always_sold(
        sold in prop::collection::vec(number_set(), 0..4),
        reserved in prop::collection::vec((number_set(), any::<bool>()), 0..4),
        assigned in prop::collection::vec((number_set(), assignment_status()), 0..4),
    ) {
        let sales: Vec<Sale> = sold.into_iter().map(|n| sale(n, 0)).collect();
        let reservations: Vec<Reservation> =
            reserved.into_iter().map(|(n, active)| reservation(n, active)).collect();
        let assignments: Vec<Assignment> =
            assigned.into_iter().map(|(n, status)| assignment(n, status)).collect();

        let board = NumberBoard::derive(TOTAL, &sales, &assignments, &reservations);

        for sale in &sales {
            for number in &sale.numbers {
                prop_assert_eq!(board.status(*number), NumberStatus::Sold);
            }
        }
        for (number, status) in board.iter() {
            let in_sale = sales.iter().any(|s| s.numbers.contains(&number));
            let held = reservations
                .iter()
                .any(|r| r.status == ReservationStatus::Active && r.numbers.contains(&number))
                || assignments
                    .iter()
                    .any(|a| a.status.is_open() && a.numbers.contains(&number));
            if !in_sale && !held {
                prop_assert_eq!(status, NumberStatus::Available);
            }
        }
    }

    #[test]
    fn selection_never_changes_persisted_status(
        sold in prop::collection::vec(number_set(), 0..3),
        reserved in prop::collection::vec(number_set(), 0..3),
        selected in prop::collection::btree_set((0..TOTAL + 5).prop_map(TicketNumber::new), 0..20),
    ) {
        let sales: Vec<Sale> = sold.into_iter().map(|n| sale(n, 0)).collect();
        let reservations: Vec<Reservation> =
            reserved.into_iter().map(|n| reservation(n, true)).collect();

        let board = NumberBoard::derive(TOTAL, &sales, &[], &reservations);
        let overlaid = board.clone().with_selection(&selected);

        for (number, status) in board.iter() {
            let shown = overlaid.status(number);
            if status == NumberStatus::Available && selected.contains(&number) {
                prop_assert_eq!(shown, NumberStatus::Selected);
            } else {
                prop_assert_eq!(shown, status);
            }
        }
        prop_assert_eq!(overlaid.len(), board.len());
    }

    #[test]
    fn numbers_not_sold_is_exact_intersection(
        sold in prop::collection::vec(number_set(), 0..4),
        candidates in number_set(),
    ) {
        let sales: Vec<Sale> = sold.into_iter().map(|n| sale(n, 0)).collect();
        let all_sold: BTreeSet<TicketNumber> =
            sales.iter().flat_map(|s| s.numbers.iter().copied()).collect();

        let found = validate_numbers_not_sold(&sales, &candidates);

        let expected: BTreeSet<TicketNumber> =
            candidates.intersection(&all_sold).copied().collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn repair_leaves_every_number_in_one_sale(
        sold in prop::collection::vec(number_set(), 1..6),
    ) {
        let price = Money::from_cents(250);
        let sales: Vec<Sale> = sold
            .into_iter()
            .enumerate()
            .map(|(minute, n)| sale(n, i64::try_from(minute).unwrap()))
            .collect();
        let before: BTreeSet<TicketNumber> =
            sales.iter().flat_map(|s| s.numbers.iter().copied()).collect();

        let plan = repair_duplicates(&sales, price);

        let repaired: Vec<Sale> = sales
            .iter()
            .filter(|s| !plan.deleted.contains(&s.id))
            .map(|s| plan.updated.iter().find(|u| u.id == s.id).unwrap_or(s).clone())
            .collect();
        prop_assert!(validate_data_integrity(&repaired).is_clean());

        let after: BTreeSet<TicketNumber> =
            repaired.iter().flat_map(|s| s.numbers.iter().copied()).collect();
        prop_assert_eq!(after, before);

        for updated in &plan.updated {
            prop_assert_eq!(updated.total, price.times(updated.numbers.len()));
        }
    }
}
