use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crosspost::api::{self, ApiServerConfig, AppState};
use crosspost::config::AppConfig;
use crosspost::database;

/// Interval between reconciliation sweeps for grants interrupted after their
/// idempotency marker was written.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_BATCH: i64 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosspost=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Missing required secrets abort here, before anything is served.
    let config = AppConfig::from_env()?;

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let state = AppState::from_config(&config, pool)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    // Background sweep: retries credit grants that failed after their marker
    // was durably written.
    {
        let reconciler = state.reconciler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = reconciler.retry_unapplied(SWEEP_BATCH).await {
                            tracing::warn!(error = %e, "Reconciliation sweep failed");
                        }
                    }
                }
            }
        });
    }

    tracing::info!("crosspost initialized successfully");

    let server_config = ApiServerConfig::from_env_or_default();
    api::server::run(state, &server_config, shutdown).await?;

    Ok(())
}
