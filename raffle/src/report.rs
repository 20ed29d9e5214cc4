//! Summary reports.

use crate::lifecycle::NumberBoard;
use crate::types::{Money, Sale};
use serde::{Deserialize, Serialize};

/// Counts and revenue of the active raffle
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RaffleStats {
    /// Numbers on sale
    pub total_numbers: usize,
    /// Numbers in a sale
    pub sold: usize,
    /// Numbers held by active reservations
    pub reserved: usize,
    /// Numbers delegated and not yet settled
    pub assigned: usize,
    /// Numbers delegated and confirmed or paid
    pub confirmed: usize,
    /// Numbers free to sell
    pub available: usize,
    /// Sales recorded
    pub sale_count: usize,
    /// Revenue of paid sales
    pub paid_revenue: Money,
    /// Revenue of pending sales
    pub pending_revenue: Money,
    /// `sold / total_numbers` as a percentage
    pub sold_percentage: f64,
}

impl RaffleStats {
    /// Compute from the derived board and the recorded sales
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Ticket counts are far below 2^52
    pub fn compute<'a>(board: &NumberBoard, sales: impl IntoIterator<Item = &'a Sale>) -> Self {
        let summary = board.summary();
        let mut stats = Self {
            total_numbers: board.len(),
            sold: summary.sold,
            reserved: summary.reserved,
            assigned: summary.assigned,
            confirmed: summary.confirmed,
            available: summary.available + summary.selected,
            ..Self::default()
        };

        for sale in sales {
            stats.sale_count += 1;
            if sale.is_paid() {
                stats.paid_revenue = stats.paid_revenue.saturating_add(sale.total);
            } else {
                stats.pending_revenue = stats.pending_revenue.saturating_add(sale.total);
            }
        }

        if stats.total_numbers > 0 {
            stats.sold_percentage = stats.sold as f64 * 100.0 / stats.total_numbers as f64;
        }

        stats
    }

    /// Paid plus pending revenue
    #[must_use]
    pub const fn expected_revenue(&self) -> Money {
        self.paid_revenue.saturating_add(self.pending_revenue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{numbers, Buyer, PaymentMethod, PaymentStatus, SaleId};
    use chrono::Utc;

    fn sale(values: &[u32], status: PaymentStatus) -> Sale {
        let numbers = numbers(values.iter().copied());
        Sale {
            id: SaleId::new(),
            buyer: Buyer::new("Ana", "555-0100"),
            total: Money::from_cents(1_000).times(numbers.len()),
            numbers,
            payment_status: status,
            payment_method: PaymentMethod::Transfer,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    #[test]
    fn test_stats() {
        let sales = [
            sale(&[0, 1], PaymentStatus::Paid),
            sale(&[2], PaymentStatus::Pending),
        ];
        let board = NumberBoard::derive(10, &sales, &[], &[]);

        let stats = RaffleStats::compute(&board, &sales);

        assert_eq!(stats.total_numbers, 10);
        assert_eq!(stats.sold, 3);
        assert_eq!(stats.available, 7);
        assert_eq!(stats.sale_count, 2);
        assert_eq!(stats.paid_revenue, Money::from_cents(2_000));
        assert_eq!(stats.pending_revenue, Money::from_cents(1_000));
        assert_eq!(stats.expected_revenue(), Money::from_cents(3_000));
        assert!((stats.sold_percentage - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_raffle_has_zero_percentage() {
        let board = NumberBoard::derive(0, &[], &[], &[]);
        let stats = RaffleStats::compute(&board, &[]);
        assert!(stats.sold_percentage.abs() < f64::EPSILON);
    }
}
