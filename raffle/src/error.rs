//! Error types for the raffle manager.

use crate::types::TicketNumber;
use raffle_core::cache::CacheError;
use raffle_core::remote::RemoteError;
use raffle_runtime::StoreError;
use thiserror::Error;

fn list(numbers: &[TicketNumber]) -> String {
    numbers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A command was rejected before anything was changed or persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No raffle is configured yet
    #[error("No active raffle is configured")]
    NoActiveRaffle,

    /// A required text field is blank
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A numeric configuration value must be positive
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    /// A raffle larger than the engine supports
    #[error("Total numbers {total} exceeds the maximum of {max}")]
    TooManyNumbers {
        /// Requested total
        total: u32,
        /// Supported maximum
        max: u32,
    },

    /// The command names no numbers
    #[error("At least one number must be selected")]
    NoNumbers,

    /// A number lies outside `0..total`
    #[error("Number {number} is outside the raffle range 0..{total}")]
    OutOfRange {
        /// Offending number
        number: TicketNumber,
        /// Total numbers of the raffle
        total: u32,
    },

    /// Some numbers already belong to a sale
    #[error("Numbers already sold: {}", list(.0))]
    AlreadySold(Vec<TicketNumber>),

    /// Some numbers are reserved or assigned
    #[error("Numbers not available: {}", list(.0))]
    NotAvailable(Vec<TicketNumber>),

    /// Referenced record does not exist
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind
        kind: &'static str,
        /// Record identifier
        id: String,
    },

    /// A record with the same id is already present
    #[error("{kind} {id} already exists")]
    AlreadyExists {
        /// Record kind
        kind: &'static str,
        /// Record identifier
        id: String,
    },

    /// The record is not in a state that allows the command
    #[error("{kind} {id} cannot change from {from}")]
    InvalidTransition {
        /// Record kind
        kind: &'static str,
        /// Record identifier
        id: String,
        /// Current status
        from: String,
    },

    /// A deadline lies in the past
    #[error("Payment deadline must be in the future")]
    DeadlineInPast,
}

/// Reconciliation with the remote store failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No remote store is configured
    #[error("Remote store is offline: {0}")]
    Offline(String),

    /// The remote store failed; local state was left untouched
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The local cache failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Startup failed.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The local cache could not be prepared
    #[error("Local cache unavailable: {0}")]
    Cache(#[from] CacheError),

    /// The store rejected the startup actions
    #[error("Store error during startup: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::numbers;

    #[test]
    fn test_already_sold_lists_numbers() {
        let error = ValidationError::AlreadySold(numbers([3, 42]).into_iter().collect());
        assert_eq!(error.to_string(), "Numbers already sold: 3, 42");
    }

    #[test]
    fn test_sync_error_wraps_remote_error() {
        let error: SyncError = RemoteError::Unauthorized.into();
        assert_eq!(error.to_string(), "Remote store rejected credentials");
    }
}
