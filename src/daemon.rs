//! Wiring between configured timers, the idle watch and the tokio scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::action::CommandAction;
use crate::config::{Config, TimerConfig};
use crate::domain::{IdleTimerHandle, ObserverEvent};
use crate::idle::IdleWatch;
use crate::registry::IdleTimeoutRegistry;
use crate::scheduler::{TimerFired, TokioScheduler};

/// Registry type used by the daemon.
pub type DaemonRegistry = IdleTimeoutRegistry<IdleWatch, TokioScheduler>;

/// Event reported by `--print-events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Idle,
    Active,
    /// The idle callback ran.
    Fired,
}

impl From<ObserverEvent> for EventKind {
    fn from(event: ObserverEvent) -> Self {
        match event {
            ObserverEvent::Idle => Self::Idle,
            ObserverEvent::Active => Self::Active,
        }
    }
}

/// One line of `--print-events` output.
#[derive(Debug, Serialize)]
struct EventLine<'a> {
    timer: &'a str,
    handle: IdleTimerHandle,
    event: EventKind,
}

/// Daemon state driven by the event loop in `main`.
pub struct Daemon {
    registry: DaemonRegistry,
    names: HashMap<IdleTimerHandle, String>,
    print_events: bool,
}

impl Daemon {
    /// Register every configured timer.
    ///
    /// Returns the daemon and the channel elapsed timers arrive on.
    pub fn new(
        config: &Config,
        print_events: bool,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TimerFired>)> {
        let (scheduler, fired_rx) = TokioScheduler::new();
        let mut daemon = Self {
            registry: IdleTimeoutRegistry::new(IdleWatch::new(), scheduler),
            names: HashMap::new(),
            print_events,
        };

        for timer in &config.timers {
            daemon.register(timer, config.dry_run)?;
        }

        Ok((daemon, fired_rx))
    }

    fn register(&mut self, timer: &TimerConfig, dry_run: bool) -> Result<IdleTimerHandle> {
        let idle_action = Arc::new(CommandAction::new(
            format!("{}/idle", timer.name),
            timer.on_idle.clone(),
            dry_run,
        ));
        let active_action = timer.on_active.as_ref().map(|command| {
            Arc::new(CommandAction::new(
                format!("{}/active", timer.name),
                command.clone(),
                dry_run,
            ))
        });

        let handle = self
            .registry
            .set_idle_timeout(
                move || idle_action.trigger(),
                move || {
                    if let Some(action) = &active_action {
                        action.trigger();
                    }
                },
                timer.timeout(),
            )
            .with_context(|| format!("Failed to register timer '{}'", timer.name))?;

        info!(
            "Timer '{}' registered as {} (timeout {}s)",
            timer.name, handle, timer.timeout_seconds
        );
        self.names.insert(handle, timer.name.clone());
        Ok(handle)
    }

    /// Feed a session idle sample. Returns the number of observer events
    /// dispatched.
    pub fn handle_idle_sample(&mut self, idle_for: Duration) -> usize {
        let events = self.registry.facility_mut().update(idle_for);
        for (handle, event) in &events {
            self.emit(*handle, (*event).into());
            self.registry.dispatch(*handle, *event);
        }
        events.len()
    }

    /// Deliver an elapsed timer. Returns whether an idle callback ran.
    pub fn handle_timer_fired(&mut self, fired: TimerFired) -> bool {
        self.registry.scheduler_mut().fired(fired.timer);
        if self.registry.timer_elapsed(fired.handle, fired.timer) {
            self.emit(fired.handle, EventKind::Fired);
            true
        } else {
            debug!("Ignored stale {} for {}", fired.timer, fired.handle);
            false
        }
    }

    /// Clear every timer. Returns how many were cleared.
    pub fn shutdown(&mut self) -> usize {
        let cleared = self.registry.clear_all();
        self.names.clear();
        cleared
    }

    pub fn registry(&self) -> &DaemonRegistry {
        &self.registry
    }

    /// Handle of the timer configured under `name`.
    pub fn handle_of(&self, name: &str) -> Option<IdleTimerHandle> {
        self.names
            .iter()
            .find_map(|(handle, n)| (n == name).then_some(*handle))
    }

    fn emit(&self, handle: IdleTimerHandle, event: EventKind) {
        if !self.print_events {
            return;
        }
        if let Some(line) = self.event_line(handle, event) {
            println!("{line}");
        }
    }

    /// JSON line for an event. Handles without a configured name print as "?".
    fn event_line(&self, handle: IdleTimerHandle, event: EventKind) -> Option<String> {
        let line = EventLine {
            timer: self.names.get(&handle).map_or("?", String::as_str),
            handle,
            event,
        };
        match serde_json::to_string(&line) {
            Ok(json) => Some(json),
            Err(e) => {
                debug!("Failed to serialize event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntryState;

    fn config(timers: &[(&str, u64)]) -> Config {
        Config {
            dry_run: true,
            timers: timers
                .iter()
                .map(|(name, secs)| TimerConfig {
                    name: (*name).to_string(),
                    timeout_seconds: *secs,
                    on_idle: format!("echo {name} idle"),
                    on_active: Some(format!("echo {name} active")),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_fires_after_threshold_and_timeout() {
        let (mut daemon, mut fired_rx) = Daemon::new(&config(&[("dim", 10)]), false).unwrap();
        let dim = daemon.handle_of("dim").unwrap();
        assert_eq!(dim.get(), 1);

        assert_eq!(daemon.handle_idle_sample(Duration::from_secs(5)), 0);
        assert_eq!(daemon.handle_idle_sample(Duration::from_secs(10)), 1);
        assert_eq!(daemon.registry().state(dim), Some(EntryState::IdlePending));

        let fired = fired_rx.recv().await.unwrap();
        assert_eq!(fired.handle, dim);
        assert!(daemon.handle_timer_fired(fired));
        assert_eq!(daemon.registry().state(dim), Some(EntryState::IdleFired));
        assert_eq!(daemon.registry().scheduler().pending(), 0);

        assert_eq!(daemon.handle_idle_sample(Duration::ZERO), 1);
        assert_eq!(daemon.registry().state(dim), Some(EntryState::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_cancels_pending_timer() {
        let (mut daemon, mut fired_rx) = Daemon::new(&config(&[("lock", 60)]), false).unwrap();
        let lock = daemon.handle_of("lock").unwrap();

        daemon.handle_idle_sample(Duration::from_secs(60));
        assert_eq!(daemon.registry().scheduler().pending(), 1);

        daemon.handle_idle_sample(Duration::ZERO);
        assert_eq!(daemon.registry().scheduler().pending(), 0);
        assert_eq!(daemon.registry().state(lock), Some(EntryState::Active));

        let waited = tokio::time::timeout(Duration::from_secs(120), fired_rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_event_lines() {
        let (daemon, _fired_rx) = Daemon::new(&config(&[("dim", 10)]), true).unwrap();
        let dim = daemon.handle_of("dim").unwrap();

        assert_eq!(
            daemon.event_line(dim, EventKind::Idle).as_deref(),
            Some(r#"{"timer":"dim","handle":1,"event":"idle"}"#)
        );
        assert_eq!(
            daemon.event_line(dim, ObserverEvent::Active.into()).as_deref(),
            Some(r#"{"timer":"dim","handle":1,"event":"active"}"#)
        );
        assert_eq!(
            daemon.event_line(dim, EventKind::Fired).as_deref(),
            Some(r#"{"timer":"dim","handle":1,"event":"fired"}"#)
        );
        assert_eq!(
            daemon
                .event_line(IdleTimerHandle::new(7), EventKind::Idle)
                .as_deref(),
            Some(r#"{"timer":"?","handle":7,"event":"idle"}"#)
        );
    }

    #[tokio::test]
    async fn test_stale_timer_is_ignored() {
        let (mut daemon, _fired_rx) = Daemon::new(&config(&[("dim", 10)]), false).unwrap();
        let dim = daemon.handle_of("dim").unwrap();

        let stale = TimerFired {
            handle: dim,
            timer: crate::domain::TimerId::new(42),
        };
        assert!(!daemon.handle_timer_fired(stale));
    }

    #[tokio::test]
    async fn test_shutdown_clears_all_timers() {
        let (mut daemon, _fired_rx) =
            Daemon::new(&config(&[("dim", 10), ("lock", 60)]), false).unwrap();
        assert_eq!(daemon.registry().len(), 2);
        assert_eq!(daemon.handle_of("lock").map(IdleTimerHandle::get), Some(2));

        assert_eq!(daemon.shutdown(), 2);
        assert!(daemon.registry().is_empty());
        assert!(daemon.registry().facility().is_empty());
        assert_eq!(daemon.handle_of("dim"), None);
    }
}
