//! Collaborator seams for the idle timeout registry.
//!
//! The registry never talks to the platform directly. It registers observers
//! with an [`IdleObserverFacility`], defers idle callbacks through a
//! [`Scheduler`], and reads time from a [`Clock`].

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::domain::{IdleTimerHandle, Observer, TimerId};

/// Platform facility that reports idle/active transitions to observers.
pub trait IdleObserverFacility {
    /// Register an observer. The facility reports events for `observer.handle`
    /// once the session has been idle for `observer.threshold`.
    fn add_observer(&mut self, observer: &Observer) -> Result<(), FacilityError>;

    /// Unregister the observer previously added for `handle`.
    fn remove_observer(&mut self, handle: IdleTimerHandle) -> Result<(), FacilityError>;
}

/// Deferred execution facility.
///
/// A scheduled timer is reported back to the registry through
/// [`IdleTimeoutRegistry::timer_elapsed`](crate::registry::IdleTimeoutRegistry::timer_elapsed).
pub trait Scheduler {
    /// Schedule a deferred invocation for `handle` after `delay`.
    fn schedule(&mut self, handle: IdleTimerHandle, delay: Duration) -> TimerId;

    /// Cancel a scheduled invocation. Unknown ids are ignored.
    fn cancel(&mut self, timer: TimerId);
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Errors reported by an idle observer facility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FacilityError {
    #[error("Observer {0} is already registered")]
    AlreadyRegistered(IdleTimerHandle),

    #[error("Observer {0} is not registered")]
    NotRegistered(IdleTimerHandle),

    #[error("Idle threshold must be greater than zero")]
    InvalidThreshold,

    #[error("Idle facility unavailable: {0}")]
    Unavailable(String),
}
