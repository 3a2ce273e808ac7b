use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Cancellable periodic driver for lifecycle recomputation. Ticks at a
/// fixed cadence (1 s in production, shrunk in tests) and fires an extra
/// immediate tick on clock-perturbation signals such as a system clock or
/// timezone change. Stopping aborts the task and invalidates any pending
/// tick.
pub struct CountdownTracker {
    handle: Mutex<Option<JoinHandle<()>>>,
    clock_events: Arc<Notify>,
}

impl CountdownTracker {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            clock_events: Arc::new(Notify::new()),
        }
    }

    pub fn start<F>(&self, tick_interval: Duration, on_tick: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop();
        let clock_events = Arc::clone(&self.clock_events);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => on_tick(),
                    _ = clock_events.notified() => on_tick(),
                }
            }
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
    }

    pub fn notify_clock_change(&self) {
        self.clock_events.notify_one();
    }

    pub fn stop(&self) {
        let Ok(mut guard) = self.handle.lock() else {
            return;
        };
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }
}

impl Default for CountdownTracker {
    fn default() -> Self {
        Self::new()
    }
}
