use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashboard_client::{DashboardClient, FileTokenStore, LogRedirect};
use dashboard_store::{persistence, DashboardStore, FileStorage, StateStorage};
use dashboard_sync::{PortfolioAggregator, RefreshScheduler, SyncConfig};
use tokio::signal::unix::SignalKind;
use tokio::time;

const DEFAULT_LOG_FILTER: &str = "dashboard_sync=info,dashboard_client=info,dashboard_store=info";

/// How often a dropped session is re-acquired.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(15);

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env().context("Invalid dashboard configuration")?;
    init_tracing(config.json_logging);

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting trading dashboard sync");
    tracing::info!("  API: {}", config.client.base_url);
    tracing::info!("  State directory: {}", config.state_dir.display());
    tracing::info!("  Request timeout: {}s", config.client.timeout.as_secs());
    tracing::info!("  Stale after: {}s", config.stale_time.as_secs());

    // Session slot and HTTP client
    let token_store = Arc::new(FileTokenStore::new(config.session_path()));
    let client = Arc::new(
        DashboardClient::new(
            &config.client,
            token_store,
            Arc::new(LogRedirect::new(config.client.login_url.clone())),
        )
        .context("Failed to build HTTP client")?,
    );
    let session = client.session().clone();

    // Persisted preferences and alerts
    let storage: Arc<dyn StateStorage> = Arc::new(FileStorage::new(&config.state_dir));
    let store = Arc::new(DashboardStore::restore(storage.as_ref()));
    persistence::attach(&store, storage);
    tracing::info!(
        "Refresh interval: {}s, {} alert(s) armed",
        store.preferences().refresh_interval,
        store.active_alerts().len()
    );

    if let Err(e) = session.ensure_session().await {
        tracing::warn!("Starting without a session, will retry: {}", e);
    }

    let aggregator = Arc::new(PortfolioAggregator::with_stale_time(
        client,
        store.clone(),
        config.stale_time,
    ));
    let scheduler = RefreshScheduler::new(aggregator);
    let consumer = scheduler.attach();

    // Run until SIGINT or SIGTERM
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut session_check = time::interval(SESSION_CHECK_INTERVAL);
    session_check.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = session_check.tick() => {
                if session.current().is_none() {
                    if let Err(e) = session.ensure_session().await {
                        tracing::warn!("Session still unavailable: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    drop(consumer);
    tracing::info!(
        connected = store.is_connected(),
        unread = store.unread_count(),
        "Dashboard sync stopped"
    );
    Ok(())
}
