//! Shell commands run as idle/active callbacks.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, error, info, trace, warn};

/// Shell used to run action commands.
const SHELL: &str = "sh";

/// Log every Nth failure once an action keeps failing.
const ERROR_LOG_RATE_LIMIT: u32 = 10;

/// Consecutive failures after which an action is reported unhealthy.
const UNHEALTHY_FAILURES: u32 = 10;

/// A named shell command triggered by an idle timer.
#[derive(Debug)]
pub struct CommandAction {
    /// Label used in logs (e.g. "dim/idle").
    label: String,

    /// Command line passed to `sh -c`.
    command: String,

    /// Dry run mode.
    dry_run: bool,

    /// Count of consecutive failures.
    consecutive_failures: AtomicU32,
}

impl CommandAction {
    pub fn new(label: impl Into<String>, command: impl Into<String>, dry_run: bool) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            dry_run,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the command to completion.
    pub async fn execute(&self) -> Result<()> {
        let args = self.build_args();

        if self.dry_run {
            info!("[DRY RUN] {}: would execute: {} {}", self.label, SHELL, args.join(" "));
            return Ok(());
        }

        debug!("{}: executing {}", self.label, self.command);

        let result = Command::new(SHELL)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn action {}", self.label))?
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for action {}", self.label))?;

        if result.status.success() {
            trace!("{}: command succeeded", self.label);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return Ok(());
        }

        let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        let stderr = String::from_utf8_lossy(&result.stderr);

        // Rate-limit error logging
        if count < 5 || count % ERROR_LOG_RATE_LIMIT == 0 {
            error!(
                "{}: command failed (exit code {:?}): {}",
                self.label,
                result.status.code(),
                stderr.trim()
            );
            if count == 5 {
                warn!(
                    "{}: rate-limiting error logs (showing every {}th error)",
                    self.label, ERROR_LOG_RATE_LIMIT
                );
            }
        }

        anyhow::bail!(
            "action {} exited with code {:?}",
            self.label,
            result.status.code()
        )
    }

    /// Spawn execution on the runtime without waiting for it.
    pub fn trigger(self: &Arc<Self>) {
        let action = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = action.execute().await {
                debug!("{:#}", e);
                if action.just_became_unhealthy() {
                    warn!(
                        "{}: failed {} times in a row, check the command",
                        action.label, UNHEALTHY_FAILURES
                    );
                }
            }
        });
    }

    /// Arguments passed to the shell.
    fn build_args(&self) -> Vec<String> {
        vec!["-c".to_string(), self.command.clone()]
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// True exactly when the last run pushed the failure streak to the
    /// unhealthy threshold, so the warning is logged once per streak.
    fn just_became_unhealthy(&self) -> bool {
        self.consecutive_failures() == UNHEALTHY_FAILURES
    }
}
