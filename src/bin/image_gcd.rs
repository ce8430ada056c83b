//! `image-gcd`: the thin CLI process that drives the image garbage
//! collector core. Bootstraps logging, loads configuration, wires up the
//! runtime/stats adapters, and either runs one cycle or starts the
//! periodic loop, shutting down cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use image_gc::clock::SystemClock;
use image_gc::config::{GcConfig, LogFormat};
use image_gc::fs_stats::StatvfsFsStats;
use image_gc::metrics::Metrics;
use image_gc::recorder::TracingEventRecorder;
use image_gc::runtime_cli::DockerCliRuntime;
use image_gc::ImageGcManager;

#[derive(Parser)]
#[command(author, version, about = "Node-local container image garbage collector", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Run a single collection cycle and exit, instead of starting the
    /// periodic detection/collection loops.
    #[arg(long)]
    once: bool,

    /// Delete every unpinned, unreferenced image and exit. Bypasses
    /// thresholds and ages entirely.
    #[arg(long, conflicts_with = "once")]
    delete_unused: bool,
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        signal_cancel.cancel();
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let contents = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let config = GcConfig::parse(&contents).context("parsing config file")?;

    init_logging(config.log_format);
    info!(config = ?cli.config, "starting image-gcd");

    let runtime = Arc::new(DockerCliRuntime::new());
    let stats = Arc::new(StatvfsFsStats::new(config.image_fs_path.clone()));
    let recorder = Arc::new(TracingEventRecorder);
    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());

    let manager = Arc::new(
        ImageGcManager::new(runtime, stats, recorder, clock, config.policy, metrics)
            .context("constructing image GC manager")?,
    );

    let cancel = shutdown_token().await;

    if cli.once {
        return match manager.garbage_collect(&cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "collection cycle failed");
                Err(e.into())
            }
        };
    }

    if cli.delete_unused {
        return match manager.delete_unused_images(&cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "delete-unused run failed");
                Err(e.into())
            }
        };
    }

    manager.start(config.periodic_config(), cancel.clone());
    cancel.cancelled().await;
    info!("image-gcd shutting down");
    Ok(())
}
