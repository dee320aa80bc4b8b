//! Periodic timers driving the background trash rescan.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel;

/// A periodic task. Returning `false` stops the timer.
pub type PeriodicTask = Box<dyn FnMut() -> bool + Send + 'static>;

/// Runs tasks on a fixed period until they are cancelled.
pub trait Scheduler: Send + Sync {
    fn schedule_periodic(&self, interval: Duration, task: PeriodicTask) -> TimerHandle;
}

/// Handle to a scheduled timer. Dropping the handle cancels the timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that controls nothing.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        self.fire_cancel();
    }

    fn fire_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.fire_cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Runs every timer on its own thread, ticking with [`channel::tick`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_periodic(&self, interval: Duration, mut task: PeriodicTask) -> TimerHandle {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let spawned = thread::Builder::new()
            .name("trash-rescan".into())
            .spawn(move || loop {
                channel::select! {
                    recv(ticker) -> _ => {
                        if !task() {
                            tracing::debug!("periodic task finished");
                            return;
                        }
                    }
                    // A message or a dropped sender both mean cancellation.
                    recv(cancel_rx) -> _ => return,
                }
            });

        match spawned {
            Ok(_) => TimerHandle::new(move || {
                let _ = cancel_tx.try_send(());
            }),
            Err(err) => {
                tracing::warn!(%err, "failed to spawn timer thread, periodic task disabled");
                TimerHandle::detached()
            }
        }
    }
}

/// Scheduler whose timers only run when [`ManualScheduler::fire`] is called.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<Vec<ManualTimer>>>,
}

struct ManualTimer {
    interval: Duration,
    task: PeriodicTask,
    cancelled: Arc<AtomicBool>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every live timer once and returns how many ran.
    pub fn fire(&self) -> usize {
        let mut timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        timers.retain(|timer| !timer.cancelled.load(Ordering::SeqCst));
        let mut ran = 0;
        timers.retain_mut(|timer| {
            ran += 1;
            (timer.task)()
        });
        ran
    }

    /// Number of timers that have not been cancelled.
    pub fn active(&self) -> usize {
        let timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        timers
            .iter()
            .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Intervals of the live timers.
    pub fn intervals(&self) -> Vec<Duration> {
        let timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        timers
            .iter()
            .filter(|timer| !timer.cancelled.load(Ordering::SeqCst))
            .map(|timer| timer.interval)
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_periodic(&self, interval: Duration, task: PeriodicTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let timer = ManualTimer {
            interval,
            task,
            cancelled: Arc::clone(&cancelled),
        };
        match self.timers.lock() {
            Ok(mut timers) => timers.push(timer),
            Err(poisoned) => poisoned.into_inner().push(timer),
        }
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("active", &self.active())
            .finish()
    }
}
