use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::service::ChecklistService;

pub type ForegroundCallback = Box<dyn Fn() + Send + Sync>;

/// Source of "application became visible" transitions. Platforms without a
/// visibility concept (headless tests, server contexts) supply
/// [`ManualForegroundSource`] or their own no-op.
pub trait ForegroundSource {
    fn subscribe(&self, callback: ForegroundCallback) -> Subscription;
}

/// Detaches its callback on `cancel()` or drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Reference foreground source with an explicit trigger.
#[derive(Default)]
pub struct ManualForegroundSource {
    inner: Arc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, ForegroundCallback>>,
}

impl ManualForegroundSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the application regaining foreground focus.
    pub fn trigger(&self) {
        let callbacks = self.inner.callbacks.lock();
        for callback in callbacks.values() {
            callback();
        }
    }
}

impl ForegroundSource for ManualForegroundSource {
    fn subscribe(&self, callback: ForegroundCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().insert(id, callback);
        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.callbacks.lock().remove(&id);
            }
        })
    }
}

struct TimerState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Disposer for a timer started with [`schedule_repeating`]. Cancelling
/// (explicitly or on drop) wakes the worker immediately and guarantees no
/// further fires.
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.signal.notify_all();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Self-rescheduling timer: sleep `delay_fn()`, fire, recompute, repeat.
/// The delay is re-evaluated after every fire, so a midnight timer stays
/// correct across DST shifts and variable day lengths.
pub fn schedule_repeating<D, F>(delay_fn: D, on_fire: F) -> TimerHandle
where
    D: Fn() -> Duration + Send + 'static,
    F: Fn() + Send + 'static,
{
    let state = Arc::new(TimerState {
        cancelled: Mutex::new(false),
        signal: Condvar::new(),
    });
    let worker = state.clone();
    thread::spawn(move || loop {
        let deadline = Instant::now() + delay_fn();
        {
            let mut cancelled = worker.cancelled.lock();
            while !*cancelled {
                if worker.signal.wait_until(&mut cancelled, deadline).timed_out() {
                    break;
                }
            }
            if *cancelled {
                return;
            }
        }
        on_fire();
    });
    TimerHandle { state }
}

const MIN_TIMER_DELAY: Duration = Duration::from_secs(1);

/// Drives checklist reloads on day rollover: a midnight timer and a
/// foreground watcher converging on the same idempotent reload, scoped to
/// this value's lifetime. Dropping it cancels the timer and detaches the
/// foreground subscription.
pub struct Reconciler {
    _timer: TimerHandle,
    _foreground: Subscription,
}

impl Reconciler {
    pub fn start(service: Arc<ChecklistService>, foreground: &dyn ForegroundSource) -> Self {
        let delay_service = service.clone();
        let fire_service = service.clone();
        let timer = schedule_repeating(
            move || {
                Duration::from_millis(delay_service.millis_until_next_midnight())
                    .max(MIN_TIMER_DELAY)
            },
            move || {
                debug!("midnight rollover, reloading checklist");
                if let Err(err) = fire_service.reload() {
                    warn!(%err, "midnight reload failed");
                }
            },
        );

        let subscription = foreground.subscribe(Box::new(move || {
            let today = service.resolve_today();
            if service.loaded_day() != Some(today) {
                debug!(day = %today, "foreground day change, reloading checklist");
                if let Err(err) = service.reload() {
                    warn!(%err, "foreground reload failed");
                }
            }
        }));

        Self {
            _timer: timer,
            _foreground: subscription,
        }
    }

    pub fn stop(self) {
        // Dropping cancels the timer and the subscription.
    }
}
