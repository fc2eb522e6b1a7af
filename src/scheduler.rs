use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::FeedEvent;
use crate::poller::{PollResult, Poller};

/// Interval used when none (or zero) is configured.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(120_000);

/// Repeating timer driving poll cycles.
///
/// Stopped until [`Scheduler::start`] is called. Each tick publishes
/// [`FeedEvent::Updating`] and launches a cycle in its own task, so a slow
/// cycle does not hold back the next tick. Feeds still in flight from an
/// earlier cycle are skipped by the poller.
///
/// Must be started from within a tokio runtime.
#[derive(Debug)]
pub struct Scheduler {
    poller: Poller,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(poller: Poller, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            interval
        };
        Self {
            poller,
            interval,
            timer: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the timer, replacing a running one. The first tick fires one
    /// interval from now.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::debug!("Replaced running update timer");
        }

        let poller = self.poller.clone();
        let period = self.interval;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poller.events().publish(FeedEvent::Updating);
                let poller = poller.clone();
                tokio::spawn(async move {
                    poller.run_cycle().await;
                });
            }
        }));

        tracing::info!(interval_ms = period.as_millis() as u64, "Update timer started");
    }

    /// Cancels the timer. Returns `false` if it was not running.
    ///
    /// Cycles already launched run to completion.
    pub fn stop(&self) -> bool {
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!("Update timer stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one cycle now. The timer's countdown is left untouched.
    pub async fn update(&self) -> Vec<PollResult> {
        self.poller.run_cycle().await
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
