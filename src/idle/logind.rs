//! Session idle time via systemd-logind `DBus` interface.
//!
//! Reads `IdleHint` and `IdleSinceHint` from the current session.

use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use anyhow::Result;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;
use zbus::Connection;

/// `DBus` service and path for login1.
const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Samples how long the current logind session has been idle.
pub struct LogindIdleSource {
    /// System bus connection, set by `init`.
    connection: Option<Connection>,

    /// Session object path in `DBus`.
    session_path: Option<String>,

    /// Whether idle sampling is available/enabled.
    enabled: bool,
}

impl LogindIdleSource {
    pub fn new() -> Self {
        Self {
            connection: None,
            session_path: None,
            enabled: true,
        }
    }

    /// Connect to the system bus and resolve the session path.
    pub async fn init(&mut self) -> Result<()> {
        let conn = Connection::system()
            .await
            .context("Failed to connect to system DBus")?;

        let session_path = resolve_session_path(&conn).await?;
        info!("Resolved session path: {}", session_path);

        self.session_path = Some(session_path);
        self.connection = Some(conn);
        Ok(())
    }

    /// Initialize, falling back to a disabled source on failure.
    pub async fn init_or_disable(&mut self) {
        if let Err(e) = self.init().await {
            error!(
                "Failed to initialize logind idle source: {:#}. Idle timers will not fire.",
                e
            );
            self.disable();
        }
    }

    /// Disable idle sampling (fallback mode).
    pub fn disable(&mut self) {
        warn!("Disabling idle sampling");
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// How long the session has been idle.
    ///
    /// Zero when the session is active, and always zero when the source is
    /// disabled or not initialized.
    pub async fn idle_for(&self) -> Result<Duration> {
        if !self.enabled {
            return Ok(Duration::ZERO);
        }
        let (Some(conn), Some(path)) = (&self.connection, &self.session_path) else {
            return Ok(Duration::ZERO);
        };

        let idle_hint = get_idle_hint(conn, path).await?;
        if !idle_hint {
            trace!("Session active");
            return Ok(Duration::ZERO);
        }

        let idle_since = get_idle_since_hint(conn, path).await?;
        let idle_for = idle_duration(idle_hint, idle_since, SystemTime::now());
        trace!("Session idle for {:?}", idle_for);
        Ok(idle_for)
    }
}

impl Default for LogindIdleSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Idle duration from logind hints.
///
/// `idle_since_usec` is `IdleSinceHint`: microseconds since the Unix epoch.
/// logind reports 0 when the timestamp is unknown, which yields zero.
pub fn idle_duration(idle_hint: bool, idle_since_usec: u64, now: SystemTime) -> Duration {
    if !idle_hint || idle_since_usec == 0 {
        return Duration::ZERO;
    }

    let since = UNIX_EPOCH + Duration::from_micros(idle_since_usec);
    now.duration_since(since).unwrap_or(Duration::ZERO)
}

/// Resolve the session object path for the current session.
async fn resolve_session_path(conn: &Connection) -> Result<String> {
    // First try XDG_SESSION_ID if available
    if let Ok(session_id) = env::var("XDG_SESSION_ID") {
        debug!("Using XDG_SESSION_ID: {}", session_id);

        let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .context("Failed to create Manager proxy")?;

        let path: zbus::zvariant::OwnedObjectPath = proxy
            .call("GetSession", &(&session_id,))
            .await
            .context("GetSession call failed")?;

        return Ok(path.to_string());
    }

    debug!("XDG_SESSION_ID not set, probing session aliases");

    for alias in ["self", "auto"] {
        let path = format!("{LOGIND_PATH}/session/{alias}");
        if get_idle_hint(conn, &path).await.is_ok() {
            return Ok(path);
        }
    }

    anyhow::bail!(
        "Could not resolve session path. Set XDG_SESSION_ID or ensure logind session is available."
    )
}

async fn get_session_property(
    conn: &Connection,
    session_path: &str,
    name: &str,
) -> Result<zbus::zvariant::OwnedValue> {
    let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, session_path, PROPERTIES_INTERFACE)
        .await
        .context("Failed to create Properties proxy")?;

    proxy
        .call("Get", &(SESSION_INTERFACE, name))
        .await
        .with_context(|| format!("Failed to get {name} property"))
}

/// Get the `IdleHint` property from a session.
async fn get_idle_hint(conn: &Connection, session_path: &str) -> Result<bool> {
    let value = get_session_property(conn, session_path, "IdleHint").await?;
    value
        .downcast_ref::<bool>()
        .map_err(|_| anyhow::anyhow!("IdleHint is not a boolean"))
}

/// Get the `IdleSinceHint` property (µs since the Unix epoch) from a session.
async fn get_idle_since_hint(conn: &Connection, session_path: &str) -> Result<u64> {
    let value = get_session_property(conn, session_path, "IdleSinceHint").await?;
    value
        .downcast_ref::<u64>()
        .map_err(|_| anyhow::anyhow!("IdleSinceHint is not a u64"))
}
