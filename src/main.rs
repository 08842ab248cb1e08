//! Whack - entry point.
//!
//! Opens the capture port, runs one dispatcher on a blocking thread and
//! prints its statistics on shutdown.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use whack::cache::AnswerCache;
use whack::clock::SystemClock;
use whack::config::Config;
use whack::dispatch::{DispatchSettings, Dispatcher};
use whack::dns::WireCodec;
use whack::network::{PnetPort, PortSettings, find_interface};

/// Resolve once Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received, shutting down...");
        }
        _ = terminate.recv() => {
            info!("SIGTERM received, shutting down...");
        }
    }

    Ok(())
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    // Before any dispatcher registers its metric handles.
    whack::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting whack...");
    info!(
        capacity = config.cache_capacity,
        ttl_seconds = config.cache_ttl_seconds,
        cleanup_seconds = config.cleanup_interval_seconds,
        burst_size = config.burst_size,
        rate_limit = config.rate_limit,
        "cache configured"
    );

    let interface =
        find_interface(config.interface.as_deref()).context("Failed to find network interface")?;
    info!("Listening on interface: {}", interface.name);

    let port = PnetPort::open(
        &interface,
        &PortSettings {
            buffer_pool_size: config.buffer_pool_size,
            poll_timeout: config.poll_timeout(),
            promiscuous: config.promiscuous,
        },
    )
    .context("Failed to open capture port")?;

    let cache = AnswerCache::new(config.capacity(), config.default_ttl());
    let dispatcher = Dispatcher::new(
        port,
        WireCodec,
        SystemClock,
        cache,
        DispatchSettings::from_config(&config, 0),
    );

    let running = Arc::new(AtomicBool::new(true));
    let worker_running = Arc::clone(&running);
    let mut worker = tokio::task::spawn_blocking(move || dispatcher.run(&worker_running));

    tokio::select! {
        result = shutdown_signal() => {
            result?;
            running.store(false, Ordering::SeqCst);
        }
        result = &mut worker => {
            // The dispatcher only returns after the flag is cleared, so this
            // is a panic.
            let report = result.context("Dispatcher failed")?;
            warn!("Dispatcher exited unexpectedly");
            println!("{report}");
            return Ok(());
        }
    }

    let report = worker.await.context("Dispatcher failed")?;
    println!("{report}");

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    run().await
}
