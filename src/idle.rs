//! Idle detection.
//!
//! [`LogindIdleSource`] samples session idle time and [`IdleWatch`] turns the
//! samples into per-observer idle/active events.

pub mod logind;
pub mod watch;

pub use logind::LogindIdleSource;
pub use watch::IdleWatch;
