//! idletimer - idle timeout registry.
//!
//! Registers idle timers that pair an idle callback and an active callback
//! with a timeout, bridged to an idle observer facility and a deferred
//! execution facility. The `idletimerd` binary wires the registry to
//! systemd-logind and runs shell commands as callbacks.

pub mod action;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod facility;
pub mod idle;
pub mod registry;
pub mod scheduler;

pub use domain::{EntryState, IdleTimerHandle, Observer, ObserverEvent, TimerId};
pub use facility::{Clock, FacilityError, IdleObserverFacility, Scheduler, SystemClock};
pub use registry::{Callback, IdleTimeoutRegistry, IdleTimerError};
