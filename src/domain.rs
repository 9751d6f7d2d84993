//! Domain types shared by the registry and its collaborators.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Identifier of an idle timer registration.
///
/// Issued by the registry in strictly increasing order starting at 1 and never
/// reused, even after the registration is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IdleTimerHandle(u64);

impl IdleTimerHandle {
    /// Wrap a raw handle value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw handle value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdleTimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a deferred invocation issued by a [`Scheduler`](crate::facility::Scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a raw timer id.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw timer id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// The hook an idle observer facility invokes on a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverEvent {
    /// Activity ceased for at least the observer's threshold.
    Idle,
    /// Activity resumed.
    Active,
}

impl ObserverEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
        }
    }
}

/// Capability registered with the idle observer facility.
///
/// The facility reports back through [`ObserverEvent`]s addressed to `handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observer {
    pub handle: IdleTimerHandle,
    pub threshold: Duration,
}

/// Lifecycle state of a registered idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// No idle callback pending.
    #[default]
    Active,
    /// The observer reported idle and the idle callback is scheduled.
    IdlePending,
    /// The idle callback ran; waiting for activity to resume.
    IdleFired,
}
