//! # Raffle
//!
//! Raffle ticket sales manager. One raffle is active at a time; its numbers
//! are sold, reserved for a limited time or delegated to intermediary
//! sellers, and every record is persisted to a remote store with a local
//! cache as mirror and fallback.
//!
//! - [`types`]: domain records
//! - [`lifecycle`]: derived status of every number
//! - [`validation`]: completeness checks and duplicate detection/repair
//! - [`sweeper`]: what an expiry tick expires
//! - [`sync`]: drift detection and force sync
//! - [`storage`]: remote-first persistence with explicit outcomes
//! - [`reducer`] / [`state`]: the raffle reducer and its owned state
//! - [`bootstrap`]: single, memoized startup
//!
//! ## Example
//!
//! ```ignore
//! use raffle::{bootstrap::bootstrap, config::Config, reducer::RaffleAction};
//!
//! let app = bootstrap(&Config::from_env()).await?;
//! app.dispatch(RaffleAction::RecordSale {
//!     sale_id: SaleId::new(),
//!     buyer: Buyer::new("Ana", "555-0100"),
//!     numbers: numbers([7, 42]),
//!     payment_method: PaymentMethod::Cash,
//!     paid: true,
//! })
//! .await?;
//! println!("{:?}", app.stats().await);
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod reducer;
pub mod report;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod sync;
pub mod types;
pub mod validation;

pub use bootstrap::{bootstrap, bootstrap_with, AppCell, RaffleApp, RaffleStore};
pub use config::Config;
pub use error::{BootstrapError, SyncError, ValidationError};
pub use reducer::{RaffleAction, RaffleEnvironment, RaffleReducer};
pub use state::RaffleState;
