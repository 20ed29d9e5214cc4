//! Configuration management for the raffle manager.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file is honored when the binary starts (see `main.rs`).

use crate::lifecycle::MAX_TOTAL_NUMBERS;
use crate::types::{Money, PaymentDetails, RaffleConfig, RaffleId};
use chrono::{DateTime, Utc};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which remote backend to use, if any
    pub remote: RemoteMode,
    /// Parameters of the raffle seeded when none exists
    pub defaults: RaffleDefaults,
    /// Timer configuration
    pub timers: TimerConfig,
    /// Directory of the file-backed local cache
    pub cache_dir: PathBuf,
    /// Tracing filter directive
    pub log_filter: String,
}

/// Remote backend selection
#[derive(Clone, PartialEq, Eq)]
pub enum RemoteMode {
    /// Direct `PostgreSQL` access
    Postgres {
        /// Connection URL
        database_url: String,
    },
    /// PostgREST-style HTTP API
    Rest {
        /// Endpoint URL
        endpoint: String,
        /// Access key
        api_key: String,
    },
    /// No usable remote store; everything stays in the local cache
    Offline {
        /// Why the remote store is not used
        reason: String,
    },
}

impl std::fmt::Debug for RemoteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { .. } => f.write_str("Postgres { database_url: <redacted> }"),
            Self::Rest { endpoint, .. } => f
                .debug_struct("Rest")
                .field("endpoint", endpoint)
                .field("api_key", &"<redacted>")
                .finish(),
            Self::Offline { reason } => f.debug_struct("Offline").field("reason", reason).finish(),
        }
    }
}

impl RemoteMode {
    /// Pick a backend from the raw credential values
    ///
    /// A database URL wins over REST credentials. REST needs both endpoint
    /// and key; one without the other is treated as misconfiguration.
    #[must_use]
    pub fn from_values(
        database_url: Option<String>,
        endpoint: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if let Some(database_url) = present(database_url) {
            return Self::Postgres { database_url };
        }

        match (present(endpoint), present(api_key)) {
            (Some(endpoint), Some(api_key)) => Self::Rest { endpoint, api_key },
            (Some(_), None) => Self::Offline {
                reason: "RAFFLE_REMOTE_KEY is not set".to_string(),
            },
            (None, Some(_)) => Self::Offline {
                reason: "RAFFLE_REMOTE_URL is not set".to_string(),
            },
            (None, None) => Self::Offline {
                reason: "no remote store configured".to_string(),
            },
        }
    }

    /// Whether a remote backend is configured
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }
}

/// Parameters for the default raffle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleDefaults {
    /// Raffle name
    pub name: String,
    /// Organizing entity
    pub organization: String,
    /// Prize description
    pub prize: String,
    /// Draw date; `None` means thirty days after seeding
    pub draw_date: Option<DateTime<Utc>>,
    /// How many numbers are on sale
    pub total_numbers: u32,
    /// Price of one number
    pub price_per_number: Money,
    /// Organizer contact phone
    pub contact_phone: String,
    /// Reservation hold, in hours
    pub hold_hours: u32,
    /// Optional social-media handle
    pub social_handle: Option<String>,
    /// Payment destination
    pub payment: PaymentDetails,
}

impl Default for RaffleDefaults {
    fn default() -> Self {
        Self {
            name: "Raffle".to_string(),
            organization: "Organization".to_string(),
            prize: "Prize".to_string(),
            draw_date: None,
            total_numbers: 100,
            price_per_number: Money::from_cents(1_000),
            contact_phone: "0000000000".to_string(),
            hold_hours: 24,
            social_handle: None,
            payment: PaymentDetails::default(),
        }
    }
}

impl RaffleDefaults {
    /// Build a fresh raffle configuration from these defaults
    #[must_use]
    pub fn to_config(&self, now: DateTime<Utc>) -> RaffleConfig {
        RaffleConfig {
            id: RaffleId::new(),
            name: self.name.clone(),
            organization: self.organization.clone(),
            prize: self.prize.clone(),
            total_numbers: self.total_numbers,
            price_per_number: self.price_per_number,
            contact_phone: self.contact_phone.clone(),
            draw_date: self
                .draw_date
                .unwrap_or_else(|| now + chrono::Duration::days(30)),
            hold_hours: self.hold_hours,
            social_handle: self.social_handle.clone(),
            payment: self.payment.clone(),
            created_at: now,
        }
    }
}

/// Timer intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Reservation expiry sweep interval (default: 30 s)
    pub sweep_interval: Duration,
    /// Drift check interval (default: 5 min)
    pub drift_check_interval: Duration,
    /// Graceful shutdown timeout (default: 5 s)
    pub shutdown_timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            drift_check_interval: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = RaffleDefaults::default();
        let timers = TimerConfig::default();

        Self {
            remote: RemoteMode::from_values(
                lookup("DATABASE_URL"),
                lookup("RAFFLE_REMOTE_URL"),
                lookup("RAFFLE_REMOTE_KEY"),
            ),
            defaults: RaffleDefaults {
                name: lookup("RAFFLE_NAME").unwrap_or(defaults.name),
                organization: lookup("RAFFLE_ORGANIZATION").unwrap_or(defaults.organization),
                prize: lookup("RAFFLE_PRIZE").unwrap_or(defaults.prize),
                draw_date: lookup("RAFFLE_DRAW_DATE")
                    .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                    .map(|d| d.with_timezone(&Utc)),
                total_numbers: lookup("RAFFLE_TOTAL_NUMBERS")
                    .and_then(|s| s.trim().parse().ok())
                    .filter(|total| (1..=MAX_TOTAL_NUMBERS).contains(total))
                    .unwrap_or(defaults.total_numbers),
                price_per_number: parsed("RAFFLE_PRICE_CENTS")
                    .map_or(defaults.price_per_number, Money::from_cents),
                contact_phone: lookup("RAFFLE_CONTACT_PHONE").unwrap_or(defaults.contact_phone),
                hold_hours: lookup("RAFFLE_HOLD_HOURS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.hold_hours),
                social_handle: lookup("RAFFLE_SOCIAL_HANDLE"),
                payment: PaymentDetails {
                    bank_name: lookup("PAYMENT_BANK_NAME"),
                    account_holder: lookup("PAYMENT_ACCOUNT_HOLDER"),
                    account_number: lookup("PAYMENT_ACCOUNT_NUMBER"),
                    instructions: lookup("PAYMENT_INSTRUCTIONS"),
                },
            },
            timers: TimerConfig {
                sweep_interval: parsed("RAFFLE_SWEEP_INTERVAL_SECS")
                    .filter(|secs| *secs > 0)
                    .map_or(timers.sweep_interval, Duration::from_secs),
                drift_check_interval: parsed("RAFFLE_DRIFT_CHECK_INTERVAL_SECS")
                    .filter(|secs| *secs > 0)
                    .map_or(timers.drift_check_interval, Duration::from_secs),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT")
                    .map_or(timers.shutdown_timeout, Duration::from_secs),
            },
            cache_dir: lookup("RAFFLE_CACHE_DIR")
                .map_or_else(|| PathBuf::from(".raffle-cache"), PathBuf::from),
            log_filter: lookup("RUST_LOG").unwrap_or_else(|| "raffle=info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]);

        assert_eq!(
            config.remote,
            RemoteMode::Offline {
                reason: "no remote store configured".to_string()
            }
        );
        assert_eq!(config.defaults, RaffleDefaults::default());
        assert_eq!(config.timers.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.cache_dir, PathBuf::from(".raffle-cache"));
        assert_eq!(config.log_filter, "raffle=info");
    }

    #[test]
    fn test_database_url_wins_over_rest() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/raffle"),
            ("RAFFLE_REMOTE_URL", "https://demo.example.co"),
            ("RAFFLE_REMOTE_KEY", "key"),
        ]);
        assert!(matches!(config.remote, RemoteMode::Postgres { .. }));
    }

    #[test]
    fn test_rest_requires_both_values() {
        let config = config_from(&[("RAFFLE_REMOTE_URL", "https://demo.example.co")]);
        assert_eq!(
            config.remote,
            RemoteMode::Offline {
                reason: "RAFFLE_REMOTE_KEY is not set".to_string()
            }
        );

        let config = config_from(&[
            ("RAFFLE_REMOTE_URL", "https://demo.example.co"),
            ("RAFFLE_REMOTE_KEY", "   "),
        ]);
        assert!(config.remote.is_offline());
    }

    #[test]
    fn test_raffle_parameters_and_bad_values() {
        let config = config_from(&[
            ("RAFFLE_NAME", "Spring Raffle"),
            ("RAFFLE_TOTAL_NUMBERS", "1000"),
            ("RAFFLE_PRICE_CENTS", "2500"),
            ("RAFFLE_HOLD_HOURS", "not-a-number"),
            ("RAFFLE_DRAW_DATE", "2025-06-01T18:00:00Z"),
            ("RAFFLE_SWEEP_INTERVAL_SECS", "0"),
            ("PAYMENT_BANK_NAME", "First Bank"),
        ]);

        assert_eq!(config.defaults.name, "Spring Raffle");
        assert_eq!(config.defaults.total_numbers, 1000);
        assert_eq!(config.defaults.price_per_number, Money::from_cents(2500));
        assert_eq!(config.defaults.hold_hours, 24);
        assert_eq!(config.timers.sweep_interval, Duration::from_secs(30));
        assert_eq!(
            config.defaults.payment.bank_name.as_deref(),
            Some("First Bank")
        );

        let oversized = config_from(&[("RAFFLE_TOTAL_NUMBERS", "4294967295")]);
        assert_eq!(oversized.defaults.total_numbers, 100);

        let seeded = config.defaults.to_config(Utc::now());
        assert_eq!(seeded.draw_date.to_rfc3339(), "2025-06-01T18:00:00+00:00");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mode = RemoteMode::Rest {
            endpoint: "https://demo.example.co".to_string(),
            api_key: "secret".to_string(),
        };
        assert!(!format!("{mode:?}").contains("secret"));
    }
}
