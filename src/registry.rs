//! Idle timeout registry.
//!
//! Tracks idle timer registrations and bridges them to an idle observer
//! facility and a deferred execution facility. Each registration moves through
//!
//! ```text
//! Active --idle--> IdlePending --timer--> IdleFired
//!   ^                  |                      |
//!   +------active------+--------active--------+
//! ```
//!
//! and is removed from any state by [`IdleTimeoutRegistry::clear_idle_timeout`].
//! The registry is driven from a single event loop and performs no locking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::domain::{EntryState, IdleTimerHandle, Observer, ObserverEvent, TimerId};
use crate::facility::{Clock, FacilityError, IdleObserverFacility, Scheduler, SystemClock};

/// Callback invoked on idle or on resumed activity.
pub type Callback = Box<dyn FnMut()>;

/// Errors returned by the registry.
#[derive(Error, Debug)]
pub enum IdleTimerError {
    #[error("Failed to register idle observer: {source}")]
    Registration {
        #[from]
        source: FacilityError,
    },
}

/// A single registration, owned by the registry.
struct IdleTimerEntry {
    idle_callback: Callback,
    active_callback: Callback,
    timeout: Duration,
    observer: Observer,
    /// At most one scheduled idle callback exists per entry.
    pending: Option<TimerId>,
    state: EntryState,
    /// Time of registration or of the last observer event.
    last_activity: Instant,
}

/// Registry of idle timers keyed by [`IdleTimerHandle`].
pub struct IdleTimeoutRegistry<F, S, C = SystemClock> {
    entries: HashMap<IdleTimerHandle, IdleTimerEntry>,
    last_handle: u64,
    facility: F,
    scheduler: S,
    clock: C,
}

impl<F, S> IdleTimeoutRegistry<F, S>
where
    F: IdleObserverFacility,
    S: Scheduler,
{
    /// Create an empty registry using the system clock.
    pub fn new(facility: F, scheduler: S) -> Self {
        Self::with_clock(facility, scheduler, SystemClock)
    }
}

impl<F, S, C> IdleTimeoutRegistry<F, S, C>
where
    F: IdleObserverFacility,
    S: Scheduler,
    C: Clock,
{
    /// Create an empty registry with an explicit clock.
    pub fn with_clock(facility: F, scheduler: S, clock: C) -> Self {
        Self {
            entries: HashMap::new(),
            last_handle: 0,
            facility,
            scheduler,
            clock,
        }
    }

    /// Register an idle timer.
    ///
    /// The observer is registered with the facility using `timeout` as its
    /// idle threshold. Once the facility reports idle, `idle_callback` is
    /// scheduled to run after a further `timeout`. Resumed activity cancels a
    /// pending idle callback and runs `active_callback`.
    ///
    /// If the facility rejects the observer, no handle is consumed and nothing
    /// is stored.
    pub fn set_idle_timeout<I, A>(
        &mut self,
        idle_callback: I,
        active_callback: A,
        timeout: Duration,
    ) -> Result<IdleTimerHandle, IdleTimerError>
    where
        I: FnMut() + 'static,
        A: FnMut() + 'static,
    {
        let handle = IdleTimerHandle::new(self.last_handle + 1);
        let last_activity = self.clock.now();
        let observer = Observer {
            handle,
            threshold: timeout,
        };

        self.facility.add_observer(&observer)?;
        self.last_handle = handle.get();

        self.entries.insert(
            handle,
            IdleTimerEntry {
                idle_callback: Box::new(idle_callback),
                active_callback: Box::new(active_callback),
                timeout,
                observer,
                pending: None,
                state: EntryState::Active,
                last_activity,
            },
        );

        debug!("Registered idle timer {} (timeout {:?})", handle, timeout);
        Ok(handle)
    }

    /// Remove an idle timer.
    ///
    /// Unregisters the observer and cancels a pending idle callback. Returns
    /// `false` if the handle is unknown or was already cleared.
    pub fn clear_idle_timeout(&mut self, handle: IdleTimerHandle) -> bool {
        let Some(entry) = self.entries.remove(&handle) else {
            debug!("Idle timer {} not found, nothing to clear", handle);
            return false;
        };

        if let Err(e) = self.facility.remove_observer(entry.observer.handle) {
            warn!("Failed to remove idle observer {}: {}", handle, e);
        }

        if let Some(timer) = entry.pending {
            trace!("Cancelling {} for idle timer {}", timer, handle);
            self.scheduler.cancel(timer);
        }

        debug!("Cleared idle timer {}", handle);
        true
    }

    /// Remove every idle timer. Returns how many were cleared.
    pub fn clear_all(&mut self) -> usize {
        let handles = self.handles();
        handles
            .into_iter()
            .filter(|handle| self.clear_idle_timeout(*handle))
            .count()
    }

    /// Deliver an observer hook for `handle`.
    ///
    /// Returns `false` if the handle is unknown.
    pub fn dispatch(&mut self, handle: IdleTimerHandle, event: ObserverEvent) -> bool {
        let now = self.clock.now();
        let Some(entry) = self.entries.get_mut(&handle) else {
            debug!("Ignoring {} event for unknown idle timer {}", event.as_str(), handle);
            return false;
        };

        entry.last_activity = now;

        match event {
            ObserverEvent::Idle => {
                if entry.state != EntryState::Active {
                    trace!("Idle timer {} already idle ({:?})", handle, entry.state);
                    return true;
                }
                let timer = self.scheduler.schedule(handle, entry.timeout);
                entry.pending = Some(timer);
                entry.state = EntryState::IdlePending;
                debug!(
                    "Idle timer {} observed idle, callback in {:?} ({})",
                    handle, entry.timeout, timer
                );
            }
            ObserverEvent::Active => {
                if let Some(timer) = entry.pending.take() {
                    debug!("Idle timer {} active again, cancelling {}", handle, timer);
                    self.scheduler.cancel(timer);
                }
                entry.state = EntryState::Active;
                (entry.active_callback)();
            }
        }

        true
    }

    /// Deliver an elapsed scheduled timer.
    ///
    /// Runs the idle callback only if `timer` is still the entry's pending
    /// timer; stale or cancelled timers are ignored. Returns whether the
    /// callback ran.
    pub fn timer_elapsed(&mut self, handle: IdleTimerHandle, timer: TimerId) -> bool {
        let Some(entry) = self.entries.get_mut(&handle) else {
            trace!("Dropping {} for cleared idle timer {}", timer, handle);
            return false;
        };

        if entry.pending != Some(timer) {
            trace!("Dropping stale {} for idle timer {}", timer, handle);
            return false;
        }

        entry.pending = None;
        entry.state = EntryState::IdleFired;
        debug!("Idle timer {} fired", handle);
        (entry.idle_callback)();
        true
    }

    pub fn contains(&self, handle: IdleTimerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn state(&self, handle: IdleTimerHandle) -> Option<EntryState> {
        self.entries.get(&handle).map(|e| e.state)
    }

    /// Time of registration or of the last observer event for `handle`.
    pub fn last_activity(&self, handle: IdleTimerHandle) -> Option<Instant> {
        self.entries.get(&handle).map(|e| e.last_activity)
    }

    pub fn timeout(&self, handle: IdleTimerHandle) -> Option<Duration> {
        self.entries.get(&handle).map(|e| e.timeout)
    }

    /// Registered handles in ascending order.
    pub fn handles(&self) -> Vec<IdleTimerHandle> {
        let mut handles: Vec<_> = self.entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn facility(&self) -> &F {
        &self.facility
    }

    pub fn facility_mut(&mut self) -> &mut F {
        &mut self.facility
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}
