//! Domain types for the raffle manager.
//!
//! Identifiers are UUID newtypes, money is integer cents and ticket numbers
//! are plain integers in `[0, total_numbers)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a raffle configuration
    RaffleId
);
uuid_id!(
    /// Unique identifier for a sale
    SaleId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for an assignment
    AssignmentId
);
uuid_id!(
    /// Unique identifier for an assignment holder (intermediary seller)
    HolderId
);

// ============================================================================
// Ticket numbers and money
// ============================================================================

/// A raffle ticket number
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// Creates a ticket number
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether the number belongs to a raffle of `total` numbers
    #[must_use]
    pub const fn is_within(self, total: u32) -> bool {
        self.0 < total
    }

    /// Zero-padded to the width of the largest number of the raffle
    ///
    /// With 1000 numbers the largest is `999`, so `7` renders as `007`.
    #[must_use]
    pub fn padded(self, total: u32) -> String {
        let width = total.saturating_sub(1).max(1).to_string().len();
        format!("{:0width$}", self.0)
    }
}

impl From<u32> for TicketNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a number set from raw values
#[must_use]
pub fn numbers<I: IntoIterator<Item = u32>>(values: I) -> BTreeSet<TicketNumber> {
    values.into_iter().map(TicketNumber::new).collect()
}

/// Money in cents
///
/// No floating point: every amount is an integer count of minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Price of `count` units at this unit price, saturating on overflow
    #[must_use]
    pub const fn times(self, count: usize) -> Self {
        Self(self.0.saturating_mul(count as u64))
    }

    /// Adds two amounts, saturating on overflow
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Buyer and raffle configuration
// ============================================================================

/// A person buying or reserving numbers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Full name
    pub name: String,
    /// Contact phone
    pub phone: String,
    /// Optional email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional city
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Buyer {
    /// Creates a buyer with the required fields
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            city: None,
        }
    }

    /// Sets the email
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the city
    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

/// Where buyers send transfer payments
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Bank or wallet name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    /// Name on the account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_holder: Option<String>,
    /// Account or card number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    /// Free-form instructions shown to buyers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// The active raffle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleConfig {
    /// Identifier
    pub id: RaffleId,
    /// Raffle name
    pub name: String,
    /// Organizing entity
    pub organization: String,
    /// Prize description
    pub prize: String,
    /// How many numbers are on sale (`0..total_numbers`)
    pub total_numbers: u32,
    /// Price of one number
    pub price_per_number: Money,
    /// Organizer contact phone
    pub contact_phone: String,
    /// When the draw takes place
    pub draw_date: DateTime<Utc>,
    /// How long a reservation holds its numbers, in hours
    pub hold_hours: u32,
    /// Optional social-media handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_handle: Option<String>,
    /// Payment destination
    #[serde(default)]
    pub payment: PaymentDetails,
    /// When the raffle was configured
    pub created_at: DateTime<Utc>,
}

impl RaffleConfig {
    /// Every number of the raffle, ascending
    pub fn all_numbers(&self) -> impl Iterator<Item = TicketNumber> {
        (0..self.total_numbers).map(TicketNumber::new)
    }

    /// Reservation hold as a duration
    #[must_use]
    pub fn hold(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.hold_hours))
    }
}

// ============================================================================
// Sales
// ============================================================================

/// Payment status of a sale
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting payment
    Pending,
    /// Paid in full
    Paid,
}

/// How a sale was (or will be) paid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash in hand
    Cash,
    /// Bank transfer
    Transfer,
    /// Card payment
    Card,
    /// Anything else
    Other,
}

/// A purchase of one or more numbers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Identifier
    pub id: SaleId,
    /// Who bought
    pub buyer: Buyer,
    /// Numbers bought (never empty)
    pub numbers: BTreeSet<TicketNumber>,
    /// Amount due for all numbers
    pub total: Money,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// When the sale was recorded
    pub created_at: DateTime<Utc>,
    /// When the sale was paid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Sale {
    /// Whether the sale is paid
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self.payment_status, PaymentStatus::Paid)
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Reservation lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Holding its numbers
    Active,
    /// Hold ran out
    Expired,
    /// Converted into a sale
    Confirmed,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Confirmed => "confirmed",
        })
    }
}

/// A time-boxed hold on numbers pending purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identifier
    pub id: ReservationId,
    /// Who reserved
    pub buyer: Buyer,
    /// Numbers held
    pub numbers: BTreeSet<TicketNumber>,
    /// When the hold started
    pub created_at: DateTime<Utc>,
    /// When the hold ends (`created_at + hold`)
    pub expires_at: DateTime<Utc>,
    /// Status
    pub status: ReservationStatus,
}

impl Reservation {
    /// Active and past its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && now > self.expires_at
    }
}

// ============================================================================
// Assignments
// ============================================================================

/// Assignment lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    /// Delegated, not yet settled
    Assigned,
    /// Holder confirmed the numbers are placed
    Confirmed,
    /// Holder paid for the numbers
    Paid,
    /// Deadline passed while still assigned
    Expired,
    /// Withdrawn by the organizer
    Cancelled,
}

impl AssignmentStatus {
    /// Whether the assignment still holds its numbers
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Assigned | Self::Confirmed | Self::Paid)
    }

    /// Allowed manual transitions; expiry is left to the sweeper
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Assigned, Self::Confirmed | Self::Paid | Self::Cancelled)
                | (Self::Confirmed, Self::Paid | Self::Cancelled)
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assigned => "assigned",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Numbers delegated to an intermediary seller under a payment deadline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Identifier
    pub id: AssignmentId,
    /// The intermediary holding the numbers
    pub holder_id: HolderId,
    /// Numbers delegated
    pub numbers: BTreeSet<TicketNumber>,
    /// Settle-by date
    pub payment_deadline: DateTime<Utc>,
    /// When the numbers were delegated
    pub created_at: DateTime<Utc>,
    /// Status
    pub status: AssignmentStatus,
}

impl Assignment {
    /// Still `assigned` and past its deadline at `now`
    #[must_use]
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Assigned && now > self.payment_deadline
    }
}

/// An intermediary seller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentHolder {
    /// Identifier
    pub id: HolderId,
    /// Name
    pub name: String,
    /// Phone
    pub phone: String,
}

/// End buyer recorded by an intermediary for one assigned number
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberOwner {
    /// The number
    pub number: TicketNumber,
    /// Assignment the number belongs to
    pub assignment_id: AssignmentId,
    /// Who holds the ticket
    pub buyer: Buyer,
}

// ============================================================================
// Archive and snapshots
// ============================================================================

/// Summary of a raffle that was replaced by a new configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRaffle {
    /// The replaced configuration
    pub config: RaffleConfig,
    /// Sales recorded
    pub sale_count: usize,
    /// Numbers sold
    pub sold_numbers: usize,
    /// Revenue from paid sales
    pub paid_revenue: Money,
    /// Revenue still pending
    pub pending_revenue: Money,
    /// When the raffle was archived
    pub archived_at: DateTime<Utc>,
}

/// Every persisted collection of the active raffle
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleSnapshot {
    /// Active configuration
    pub config: Option<RaffleConfig>,
    /// Sales
    pub sales: Vec<Sale>,
    /// Reservations
    pub reservations: Vec<Reservation>,
    /// Assignments
    pub assignments: Vec<Assignment>,
    /// Intermediary sellers
    pub holders: Vec<AssignmentHolder>,
    /// End buyers of assigned numbers
    pub owners: Vec<NumberOwner>,
}
