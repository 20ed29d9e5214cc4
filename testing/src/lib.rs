//! # Raffle Testing
//!
//! Testing utilities for the raffle manager.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - `ReducerTest`, a Given/When/Then harness for reducers
//! - In-memory `RemoteStore` and `LocalCache` implementations with failure
//!   injection
//!
//! ## Example
//!
//! ```ignore
//! use raffle_testing::{InMemoryLocalCache, InMemoryRemoteStore};
//!
//! #[tokio::test]
//! async fn remote_outage_falls_back_to_cache() {
//!     let remote = InMemoryRemoteStore::new();
//!     remote.fail_writes(true);
//!     let repository = RaffleRepository::new(Arc::new(remote), Arc::new(InMemoryLocalCache::new()));
//!
//!     let outcome = repository.save(&sale).await;
//!     assert!(outcome.is_local_fallback());
//! }
//! ```

use chrono::{DateTime, Utc};
use raffle_core::environment::Clock;

pub mod reducer_test;
pub mod remote_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use raffle_testing::mocks::FixedClock;
    /// use raffle_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock whose time only moves when a test moves it
    ///
    /// Clones share the same instant, so a test can keep one handle while
    /// the environment owns another.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    #[allow(clippy::unwrap_used)] // Test infrastructure
    impl ManualClock {
        /// Create a clock starting at the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to an exact instant
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    #[allow(clippy::unwrap_used)] // Test infrastructure
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant every test clock starts from (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, test_epoch, FixedClock, ManualClock};
pub use reducer_test::{assertions, ReducerTest};
pub use remote_mocks::{InMemoryLocalCache, InMemoryRemoteStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_clock_shares_time_between_clones() {
        let clock = ManualClock::new(test_epoch());
        let handle = clock.clone();

        handle.advance(chrono::Duration::minutes(90));

        assert_eq!(clock.now(), test_epoch() + chrono::Duration::minutes(90));

        clock.set(test_epoch());
        assert_eq!(handle.now(), test_epoch());
    }
}
