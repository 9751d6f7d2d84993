//! idletimerd - run commands when the session goes idle and when it resumes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use idletimer::config::Config;
use idletimer::daemon::Daemon;
use idletimer::idle::LogindIdleSource;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Idle timer daemon for systemd-logind sessions.
///
/// Runs each configured timer's `on_idle` command once the session has been
/// idle for its threshold plus its timeout, and `on_active` when activity
/// resumes.
#[derive(Parser, Debug)]
#[command(name = "idletimerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log commands instead of running them).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print idle/active/fired events to stdout as JSON lines.
    #[arg(long)]
    print_events: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("idletimerd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if args.dry_run {
        config.dry_run = true;
    }

    info!(
        "Configuration loaded ({} timers, dry_run={})",
        config.timers.len(),
        config.dry_run
    );

    if args.check_config {
        println!("Configuration OK ({} timers)", config.timers.len());
        return Ok(());
    }

    if config.timers.is_empty() {
        warn!("No timers configured; nothing will run");
    }

    run_daemon(&config, args.print_events).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("idletimer={level},idletimerd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Run daemon event loop until SIGINT/SIGTERM.
async fn run_daemon(config: &Config, print_events: bool) -> Result<()> {
    let (mut daemon, mut fired_rx) = Daemon::new(config, print_events)?;

    let mut source = LogindIdleSource::new();
    source.init_or_disable().await;

    let mut poll_timer = tokio::time::interval(config.poll_interval());
    poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Daemon started, polling idle state every {:?}", config.poll_interval());

    loop {
        tokio::select! {
            _ = poll_timer.tick() => {
                match source.idle_for().await {
                    Ok(idle_for) => {
                        daemon.handle_idle_sample(idle_for);
                    }
                    Err(e) => {
                        warn!("Failed to poll idle state: {:#}", e);
                        // Don't disable on transient errors, just log
                    }
                }
            }

            Some(fired) = fired_rx.recv() => {
                daemon.handle_timer_fired(fired);
            }

            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Signal handling failed: {:#}", e);
                }
                break;
            }
        }
    }

    let cleared = daemon.shutdown();
    debug!("Cleared {} idle timers", cleared);
    info!("idletimerd stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            info!("Received SIGINT, shutting down");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    Ok(())
}
