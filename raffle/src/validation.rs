//! Validation layer: record completeness, sold-number checks and duplicate
//! detection/repair across sales.

use crate::error::ValidationError;
use crate::lifecycle::MAX_TOTAL_NUMBERS;
use crate::types::{Buyer, Money, RaffleConfig, Sale, SaleId, TicketNumber};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Candidates already present in some sale (empty when none are sold).
#[must_use]
pub fn validate_numbers_not_sold<'a>(
    sales: impl IntoIterator<Item = &'a Sale>,
    candidates: &BTreeSet<TicketNumber>,
) -> BTreeSet<TicketNumber> {
    let mut sold = BTreeSet::new();
    for sale in sales {
        sold.extend(sale.numbers.intersection(candidates).copied());
    }
    sold
}

/// Numbers held by more than one sale.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Contested number → every sale containing it
    pub duplicates: BTreeMap<TicketNumber, Vec<SaleId>>,
}

impl IntegrityReport {
    /// No duplicates found
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
    }
}

/// Report every number appearing in more than one sale. Nothing is fixed.
#[must_use]
pub fn validate_data_integrity<'a>(sales: impl IntoIterator<Item = &'a Sale>) -> IntegrityReport {
    let mut owners: BTreeMap<TicketNumber, Vec<SaleId>> = BTreeMap::new();
    for sale in sales {
        for number in &sale.numbers {
            owners.entry(*number).or_default().push(sale.id);
        }
    }
    owners.retain(|_, ids| ids.len() > 1);
    for ids in owners.values_mut() {
        ids.sort();
    }
    IntegrityReport { duplicates: owners }
}

/// Changes that resolve every duplicate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairPlan {
    /// Sales that lost numbers, with recomputed totals
    pub updated: Vec<Sale>,
    /// Sales left without numbers
    pub deleted: Vec<SaleId>,
}

impl RepairPlan {
    /// Nothing to change
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Plan the removal of duplicated numbers.
///
/// For each contested number the earliest sale (by `created_at`, then id)
/// keeps it. Every other sale loses it and its total becomes
/// `remaining × price`; a sale left empty is deleted.
#[must_use]
pub fn repair_duplicates(sales: &[Sale], price: Money) -> RepairPlan {
    let mut ordered: Vec<&Sale> = sales.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut claimed: BTreeSet<TicketNumber> = BTreeSet::new();
    let mut plan = RepairPlan::default();

    for sale in ordered {
        let kept: BTreeSet<TicketNumber> = sale.numbers.difference(&claimed).copied().collect();
        claimed.extend(sale.numbers.iter().copied());

        if kept.len() == sale.numbers.len() {
            continue;
        }

        if kept.is_empty() {
            plan.deleted.push(sale.id);
        } else {
            let mut repaired = sale.clone();
            repaired.total = price.times(kept.len());
            repaired.numbers = kept;
            plan.updated.push(repaired);
        }
    }

    plan
}

/// Buyer name and phone must be present.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] naming the blank field.
pub fn validate_buyer(buyer: &Buyer) -> Result<(), ValidationError> {
    if buyer.name.trim().is_empty() {
        return Err(ValidationError::MissingField("Buyer name"));
    }
    if buyer.phone.trim().is_empty() {
        return Err(ValidationError::MissingField("Buyer phone"));
    }
    Ok(())
}

/// Raffle configuration must be complete.
///
/// # Errors
///
/// Returns the first missing or non-positive field.
pub fn validate_config(config: &RaffleConfig) -> Result<(), ValidationError> {
    let required = [
        ("Raffle name", &config.name),
        ("Organization", &config.organization),
        ("Prize", &config.prize),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    if config.total_numbers == 0 {
        return Err(ValidationError::NotPositive("Total numbers"));
    }
    if config.total_numbers > MAX_TOTAL_NUMBERS {
        return Err(ValidationError::TooManyNumbers {
            total: config.total_numbers,
            max: MAX_TOTAL_NUMBERS,
        });
    }
    if config.price_per_number.is_zero() {
        return Err(ValidationError::NotPositive("Price per number"));
    }
    if config.hold_hours == 0 {
        return Err(ValidationError::NotPositive("Reservation hold"));
    }
    Ok(())
}

/// A number set must be non-empty and inside the raffle range.
///
/// # Errors
///
/// Returns [`ValidationError::NoNumbers`] or the first out-of-range number.
pub fn validate_number_set(
    numbers: &BTreeSet<TicketNumber>,
    total_numbers: u32,
) -> Result<(), ValidationError> {
    if numbers.is_empty() {
        return Err(ValidationError::NoNumbers);
    }
    if let Some(number) = numbers.iter().find(|n| !n.is_within(total_numbers)) {
        return Err(ValidationError::OutOfRange {
            number: *number,
            total: total_numbers,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RaffleDefaults;
    use crate::types::{numbers, PaymentMethod, PaymentStatus};
    use chrono::{Duration, Utc};

    fn sale_at(values: &[u32], minutes: i64) -> Sale {
        let numbers = numbers(values.iter().copied());
        Sale {
            id: SaleId::new(),
            buyer: Buyer::new("Ana", "555-0100"),
            total: Money::from_cents(500).times(numbers.len()),
            numbers,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cash,
            created_at: Utc::now() + Duration::minutes(minutes),
            paid_at: None,
        }
    }

    #[test]
    fn test_numbers_not_sold_returns_sold_subset() {
        let sales = [sale_at(&[1, 2], 0), sale_at(&[7], 1)];

        assert_eq!(
            validate_numbers_not_sold(&sales, &numbers([2, 3, 7])),
            numbers([2, 7])
        );
        assert!(validate_numbers_not_sold(&sales, &numbers([0, 3])).is_empty());
    }

    #[test]
    fn test_integrity_reports_duplicates_only() {
        let first = sale_at(&[42, 1], 0);
        let second = sale_at(&[42, 2], 1);
        let sales = [first.clone(), second.clone()];

        let report = validate_data_integrity(&sales);

        assert_eq!(report.duplicates.len(), 1);
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(report.duplicates[&TicketNumber::new(42)], expected);
    }

    #[test]
    fn test_repair_keeps_number_in_earliest_sale() {
        let first = sale_at(&[42, 1], 0);
        let second = sale_at(&[42, 2, 3], 5);
        let price = Money::from_cents(500);

        let plan = repair_duplicates(&[second.clone(), first], price);

        assert_eq!(plan.deleted, vec![]);
        assert_eq!(plan.updated.len(), 1);
        assert_eq!(plan.updated[0].id, second.id);
        assert_eq!(plan.updated[0].numbers, numbers([2, 3]));
        assert_eq!(plan.updated[0].total, Money::from_cents(1_000));
    }

    #[test]
    fn test_repair_deletes_emptied_sale() {
        let first = sale_at(&[5, 6], 0);
        let second = sale_at(&[6], 1);

        let plan = repair_duplicates(&[first, second.clone()], Money::from_cents(500));

        assert!(plan.updated.is_empty());
        assert_eq!(plan.deleted, vec![second.id]);
    }

    #[test]
    fn test_repair_without_duplicates_is_empty() {
        let plan = repair_duplicates(&[sale_at(&[1], 0), sale_at(&[2], 1)], Money::from_cents(500));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_completeness_checks() {
        assert_eq!(
            validate_buyer(&Buyer::new(" ", "555")),
            Err(ValidationError::MissingField("Buyer name"))
        );
        assert_eq!(
            validate_buyer(&Buyer::new("Ana", "")),
            Err(ValidationError::MissingField("Buyer phone"))
        );
        assert_eq!(
            validate_number_set(&numbers([]), 10),
            Err(ValidationError::NoNumbers)
        );
        assert_eq!(
            validate_number_set(&numbers([3, 10]), 10),
            Err(ValidationError::OutOfRange {
                number: TicketNumber::new(10),
                total: 10
            })
        );
        assert_eq!(validate_number_set(&numbers([0, 9]), 10), Ok(()));
    }

    #[test]
    fn test_config_total_is_capped() {
        let mut config = RaffleDefaults::default().to_config(Utc::now());
        config.total_numbers = MAX_TOTAL_NUMBERS;
        assert_eq!(validate_config(&config), Ok(()));

        config.total_numbers = u32::MAX;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::TooManyNumbers {
                total: u32::MAX,
                max: MAX_TOTAL_NUMBERS
            })
        );
    }
}
