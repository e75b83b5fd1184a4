//! nscache-sweeper - keeps namespace index hashes free of expired keys
//!
//! Connects to the configured store and periodically reconciles the listed
//! namespaces until interrupted.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use namespaced_cache::{spawn_reconcile_task, Config, NamespacedCache};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Main entry point for the sweeper.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load cache configuration and sweep settings from environment variables
/// 3. Connect to the store and verify it answers
/// 4. Start the reconcile task
/// 5. Abort it on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "namespaced_cache=info,nscache_sweeper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting namespace index sweeper");

    let config = Config::from_env().context("invalid cache configuration")?;
    let namespaces = sweep_namespaces(&config);
    let interval = sweep_interval()?;
    info!(
        "Configuration loaded: host={}, db={}, prefix={:?}, namespaces={:?}, interval={:?}",
        config.host, config.db, config.prefix, namespaces, interval
    );

    let cache = NamespacedCache::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}", config.host))?;

    let handle = spawn_reconcile_task(Arc::new(cache), namespaces, interval);
    info!("Reconcile task started");

    shutdown_signal().await?;

    handle.abort();
    warn!("Reconcile task aborted");
    info!("Sweeper shutdown complete");
    Ok(())
}

/// Namespaces from `NSCACHE_SWEEP_NAMESPACES`, falling back to the default one.
fn sweep_namespaces(config: &Config) -> Vec<String> {
    let listed: Vec<String> = env::var("NSCACHE_SWEEP_NAMESPACES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if listed.is_empty() {
        vec![config.hset_name.clone()]
    } else {
        listed
    }
}

/// Sweep period from `NSCACHE_SWEEP_INTERVAL` in seconds.
fn sweep_interval() -> anyhow::Result<Duration> {
    let secs = match env::var("NSCACHE_SWEEP_INTERVAL") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("NSCACHE_SWEEP_INTERVAL={raw:?} is not a number of seconds"))?,
        Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
    };
    if secs == 0 {
        bail!("NSCACHE_SWEEP_INTERVAL must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
    Ok(())
}
