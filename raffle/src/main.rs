//! Raffle manager daemon.
//!
//! Loads the active raffle, keeps the reservation expiry sweeper running and
//! periodically compares the local cache with the remote store until
//! interrupted.

use raffle::{bootstrap::app, config::Config, reducer::RaffleAction, RaffleApp};
use raffle_runtime::StoreError;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("raffle=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        remote = ?config.remote,
        cache_dir = %config.cache_dir.display(),
        sweep_interval = ?config.timers.sweep_interval,
        "Configuration loaded"
    );

    let app = app(&config).await?;
    log_stats(&app).await;

    let mut drift_timer = tokio::time::interval(config.timers.drift_check_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = drift_timer.tick() => {
                if app.repository.is_online() {
                    app.dispatch(RaffleAction::CheckDrift).await?;
                    log_drift(&app).await;
                }
            },
            () = &mut shutdown => break,
        }
    }

    app.dispatch(RaffleAction::DisarmSweeper).await?;
    match app.store.shutdown(config.timers.shutdown_timeout).await {
        Ok(()) => {},
        // The last sweep timer is still sleeping; nothing is lost.
        Err(StoreError::ShutdownTimeout(pending)) => {
            info!(pending, "Dropped pending timers at shutdown");
        },
        Err(e) => warn!(error = %e, "Unclean shutdown"),
    }

    info!("Raffle manager stopped");
    Ok(())
}

async fn log_stats(app: &RaffleApp) {
    let (stats, unsynced) = app
        .store
        .state(|s| (s.stats(), s.unsynced_writes.len()))
        .await;
    info!(
        total = stats.total_numbers,
        sold = stats.sold,
        reserved = stats.reserved,
        assigned = stats.assigned + stats.confirmed,
        available = stats.available,
        sales = stats.sale_count,
        paid = %stats.paid_revenue,
        pending = %stats.pending_revenue,
        unsynced,
        "Raffle status"
    );
}

async fn log_drift(app: &RaffleApp) {
    let drift = app.store.state(|s| s.last_drift.clone()).await;
    match drift {
        Some(report) if report.possible_remote_reset() => warn!(
            local = report.local_sales,
            remote = report.remote_sales,
            "Remote store looks reset; a force sync would discard local sales"
        ),
        Some(report) if report.sync_needed() => info!(
            local = report.local_sales,
            remote = report.remote_sales,
            "Local cache and remote store differ"
        ),
        _ => {},
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
