//! Deferred execution on the tokio runtime.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::domain::{IdleTimerHandle, TimerId};
use crate::facility::Scheduler;

/// A scheduled timer that elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub handle: IdleTimerHandle,
    pub timer: TimerId,
}

/// [`Scheduler`] that sleeps on spawned tokio tasks and reports elapsed
/// timers on a channel.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerFired>,
    tasks: HashMap<TimerId, AbortHandle>,
    last_timer: u64,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its timers are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            tasks: HashMap::new(),
            last_timer: 0,
        };
        (scheduler, rx)
    }

    /// Forget a timer whose [`TimerFired`] was received.
    pub fn fired(&mut self, timer: TimerId) {
        self.tasks.remove(&timer);
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, handle: IdleTimerHandle, delay: Duration) -> TimerId {
        self.last_timer += 1;
        let timer = TimerId::new(self.last_timer);
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the daemon is shutting down.
            let _ = tx.send(TimerFired { handle, timer });
        });

        trace!("Scheduled {} for {} in {:?}", timer, handle, delay);
        self.tasks.insert(timer, task.abort_handle());
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(task) = self.tasks.remove(&timer) {
            task.abort();
            trace!("Cancelled {}", timer);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
