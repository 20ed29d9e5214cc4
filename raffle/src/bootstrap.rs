//! Application startup.
//!
//! Startup connects the configured remote store (falling back to offline
//! mode), opens the local cache, loads every collection, seeds a default
//! raffle when none exists and arms the expiry sweeper. [`AppCell`] makes
//! that sequence run at most once, even when several callers race for it.

use crate::config::{Config, RaffleDefaults, RemoteMode};
use crate::error::BootstrapError;
use crate::reducer::{RaffleAction, RaffleEnvironment, RaffleReducer};
use crate::report::RaffleStats;
use crate::state::RaffleState;
use crate::storage::{FileCache, RaffleRepository, REMOTE_TABLES};
use raffle_core::cache::LocalCache;
use raffle_core::environment::{Clock, SystemClock};
use raffle_core::remote::RemoteStore;
use raffle_postgres::PostgresRemoteStore;
use raffle_rest::RestRemoteStore;
use raffle_runtime::Store;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Runtime store of the raffle manager
pub type RaffleStore = Store<RaffleState, RaffleAction, RaffleEnvironment, RaffleReducer>;

/// A started raffle manager
pub struct RaffleApp {
    /// Store driving the raffle reducer
    pub store: RaffleStore,
    /// Persistence adapter shared with the reducer
    pub repository: Arc<RaffleRepository>,
}

impl std::fmt::Debug for RaffleApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaffleApp")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl RaffleApp {
    /// Current counts and revenue
    pub async fn stats(&self) -> RaffleStats {
        self.store.state(RaffleState::stats).await
    }

    /// Send an action and wait for its effects
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Store`] once the store is shutting down.
    pub async fn dispatch(&self, action: RaffleAction) -> Result<(), BootstrapError> {
        self.store.send(action).await?.wait().await;
        Ok(())
    }
}

/// Connect the configured remote store
///
/// Returns the reason to run offline when no store can be used.
pub async fn connect_remote(mode: &RemoteMode) -> Result<Arc<dyn RemoteStore>, String> {
    match mode {
        RemoteMode::Postgres { database_url } => {
            let store = PostgresRemoteStore::new(database_url)
                .await
                .map_err(|e| format!("postgres: {e}"))?;
            store
                .migrate(&REMOTE_TABLES)
                .await
                .map_err(|e| format!("postgres migration: {e}"))?;
            Ok(Arc::new(store))
        },
        RemoteMode::Rest { endpoint, api_key } => RestRemoteStore::new(endpoint, api_key)
            .map(|store| Arc::new(store) as Arc<dyn RemoteStore>)
            .map_err(|e| format!("rest: {e}")),
        RemoteMode::Offline { reason } => Err(reason.clone()),
    }
}

/// Start the raffle manager from configuration
///
/// # Errors
///
/// Returns [`BootstrapError::Cache`] if the cache directory cannot be
/// created. Remote failures never fail startup; they select offline mode.
pub async fn bootstrap(config: &Config) -> Result<RaffleApp, BootstrapError> {
    let cache: Arc<dyn LocalCache> = Arc::new(FileCache::open(&config.cache_dir).await?);

    let repository = match connect_remote(&config.remote).await {
        Ok(remote) => {
            tracing::info!(backend = remote.backend(), "Remote store connected");
            RaffleRepository::new(remote, cache)
        },
        Err(reason) => {
            tracing::warn!(reason = %reason, "Running offline, local cache only");
            RaffleRepository::offline(cache, reason)
        },
    };

    bootstrap_with(
        Arc::new(repository),
        Arc::new(SystemClock),
        config.defaults.clone(),
        config.timers.sweep_interval,
    )
    .await
}

/// Start the raffle manager over an existing repository
///
/// # Errors
///
/// Returns [`BootstrapError::Store`] if the store rejects a startup action.
pub async fn bootstrap_with(
    repository: Arc<RaffleRepository>,
    clock: Arc<dyn Clock>,
    defaults: RaffleDefaults,
    sweep_interval: Duration,
) -> Result<RaffleApp, BootstrapError> {
    let environment =
        RaffleEnvironment::new(clock, Arc::clone(&repository), defaults, sweep_interval);
    let store = Store::new(RaffleState::new(), RaffleReducer::new(), environment);

    store.send(RaffleAction::LoadRequested).await?.wait().await;
    store.send(RaffleAction::SeedDefaultConfig).await?.wait().await;
    // The sweeper handle only completes when the timer chain stops.
    store.send(RaffleAction::ArmSweeper).await?;

    let (sales, source) = store
        .state(|s| (s.sales.len(), s.load_source.clone()))
        .await;
    tracing::info!(
        backend = repository.backend(),
        sales,
        source = ?source,
        "Raffle manager ready"
    );

    Ok(RaffleApp { store, repository })
}

/// Memoized application instance
///
/// The first successful initialization wins; later callers get the same
/// instance. A failed initialization leaves the cell empty so the next
/// caller retries.
#[derive(Debug, Default)]
pub struct AppCell {
    cell: OnceCell<Arc<RaffleApp>>,
    builds: AtomicUsize,
}

impl AppCell {
    /// Empty cell
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The application, built by `init` on first use
    ///
    /// # Errors
    ///
    /// Returns the error of `init` when it fails.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<RaffleApp>, BootstrapError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RaffleApp, BootstrapError>>,
    {
        self.cell
            .get_or_try_init(|| async move {
                self.builds.fetch_add(1, Ordering::SeqCst);
                init().await.map(Arc::new)
            })
            .await
            .map(Arc::clone)
    }

    /// The application, if already built
    #[must_use]
    pub fn get(&self) -> Option<Arc<RaffleApp>> {
        self.cell.get().map(Arc::clone)
    }

    /// How many times initialization started
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

static APP: OnceLock<AppCell> = OnceLock::new();

/// Process-wide application, bootstrapped from `config` on first call
///
/// # Errors
///
/// Returns the [`BootstrapError`] of a failed first bootstrap.
pub async fn app(config: &Config) -> Result<Arc<RaffleApp>, BootstrapError> {
    APP.get_or_init(AppCell::new)
        .get_or_init(|| bootstrap(config))
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_mode_is_reported_as_reason() {
        let reason = connect_remote(&RemoteMode::Offline {
            reason: "no remote store configured".to_string(),
        })
        .await
        .err()
        .unwrap();
        assert_eq!(reason, "no remote store configured");
    }

    #[tokio::test]
    async fn test_malformed_rest_endpoint_goes_offline() {
        let reason = connect_remote(&RemoteMode::Rest {
            endpoint: "not a url".to_string(),
            api_key: "key".to_string(),
        })
        .await
        .err()
        .unwrap();
        assert!(reason.starts_with("rest:"));
    }

    #[tokio::test]
    async fn test_bootstrap_offline_seeds_default_raffle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            remote: RemoteMode::Offline {
                reason: "test".to_string(),
            },
            cache_dir: dir.path().to_path_buf(),
            ..Config::from_lookup(|_| None)
        };

        let app = bootstrap(&config).await.unwrap();

        assert_eq!(app.repository.backend(), "offline");
        let name = app
            .store
            .state(|s| s.config.as_ref().map(|c| c.name.clone()))
            .await;
        assert_eq!(name.as_deref(), Some("Raffle"));
        assert_eq!(app.stats().await.available, 100);
        assert!(dir.path().join("raffle_config.json").exists());
    }
}
