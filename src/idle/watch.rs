//! Threshold tracking for registered idle observers.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, trace};

use crate::domain::{IdleTimerHandle, Observer, ObserverEvent};
use crate::facility::{FacilityError, IdleObserverFacility};

#[derive(Debug)]
struct Watched {
    threshold: Duration,
    idle: bool,
}

/// Idle observer facility fed with sampled session idle durations.
///
/// Each sample passed to [`IdleWatch::update`] is compared against every
/// observer's threshold; crossings produce one event per observer.
#[derive(Debug, Default)]
pub struct IdleWatch {
    observers: BTreeMap<IdleTimerHandle, Watched>,
}

impl IdleWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current idle duration and collect observer transitions,
    /// ordered by handle.
    pub fn update(&mut self, idle_for: Duration) -> Vec<(IdleTimerHandle, ObserverEvent)> {
        let mut events = Vec::new();

        for (handle, watched) in &mut self.observers {
            let idle = idle_for >= watched.threshold;
            if idle == watched.idle {
                continue;
            }
            watched.idle = idle;

            let event = if idle {
                ObserverEvent::Idle
            } else {
                ObserverEvent::Active
            };
            debug!(
                "Observer {} -> {} (idle for {:?}, threshold {:?})",
                handle,
                event.as_str(),
                idle_for,
                watched.threshold
            );
            events.push((*handle, event));
        }

        if events.is_empty() {
            trace!("Idle for {:?}, no observer transitions", idle_for);
        }

        events
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn is_idle(&self, handle: IdleTimerHandle) -> Option<bool> {
        self.observers.get(&handle).map(|w| w.idle)
    }
}

impl IdleObserverFacility for IdleWatch {
    fn add_observer(&mut self, observer: &Observer) -> Result<(), FacilityError> {
        if observer.threshold.is_zero() {
            return Err(FacilityError::InvalidThreshold);
        }
        if self.observers.contains_key(&observer.handle) {
            return Err(FacilityError::AlreadyRegistered(observer.handle));
        }

        self.observers.insert(
            observer.handle,
            Watched {
                threshold: observer.threshold,
                idle: false,
            },
        );
        Ok(())
    }

    fn remove_observer(&mut self, handle: IdleTimerHandle) -> Result<(), FacilityError> {
        self.observers
            .remove(&handle)
            .map(|_| ())
            .ok_or(FacilityError::NotRegistered(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer(handle: u64, secs: u64) -> Observer {
        Observer {
            handle: IdleTimerHandle::new(handle),
            threshold: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let mut watch = IdleWatch::new();
        let err = watch.add_observer(&observer(1, 0)).unwrap_err();
        assert_eq!(err, FacilityError::InvalidThreshold);
        assert!(watch.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_observer() {
        let mut watch = IdleWatch::new();
        watch.add_observer(&observer(1, 10)).unwrap();
        let err = watch.add_observer(&observer(1, 20)).unwrap_err();
        assert_eq!(err, FacilityError::AlreadyRegistered(IdleTimerHandle::new(1)));
    }

    #[test]
    fn test_remove_unknown_observer() {
        let mut watch = IdleWatch::new();
        let err = watch.remove_observer(IdleTimerHandle::new(3)).unwrap_err();
        assert_eq!(err, FacilityError::NotRegistered(IdleTimerHandle::new(3)));
    }

    #[test]
    fn test_transitions_fire_once_per_idle_period() {
        let mut watch = IdleWatch::new();
        watch.add_observer(&observer(1, 10)).unwrap();

        assert!(watch.update(Duration::from_secs(5)).is_empty());
        assert_eq!(
            watch.update(Duration::from_secs(10)),
            vec![(IdleTimerHandle::new(1), ObserverEvent::Idle)]
        );
        assert!(watch.update(Duration::from_secs(30)).is_empty());
        assert_eq!(watch.is_idle(IdleTimerHandle::new(1)), Some(true));

        assert_eq!(
            watch.update(Duration::ZERO),
            vec![(IdleTimerHandle::new(1), ObserverEvent::Active)]
        );
        assert!(watch.update(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_thresholds_are_independent() {
        let mut watch = IdleWatch::new();
        watch.add_observer(&observer(1, 10)).unwrap();
        watch.add_observer(&observer(2, 60)).unwrap();

        assert_eq!(
            watch.update(Duration::from_secs(20)),
            vec![(IdleTimerHandle::new(1), ObserverEvent::Idle)]
        );
        assert_eq!(
            watch.update(Duration::from_secs(61)),
            vec![(IdleTimerHandle::new(2), ObserverEvent::Idle)]
        );
        assert_eq!(
            watch.update(Duration::ZERO),
            vec![
                (IdleTimerHandle::new(1), ObserverEvent::Active),
                (IdleTimerHandle::new(2), ObserverEvent::Active),
            ]
        );
    }

    #[test]
    fn test_removed_observer_gets_no_events() {
        let mut watch = IdleWatch::new();
        watch.add_observer(&observer(1, 10)).unwrap();
        watch.remove_observer(IdleTimerHandle::new(1)).unwrap();

        assert!(watch.update(Duration::from_secs(100)).is_empty());
        assert_eq!(watch.is_idle(IdleTimerHandle::new(1)), None);
    }
}
