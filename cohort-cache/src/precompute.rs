//! Opportunistic background warm-up of a shared cache.
//!
//! A view that knows its user will probably open an expensive aggregate
//! soon schedules a one-shot precompute after activation. The timer is
//! cancellable until it fires; once it has fired the fetch belongs to the
//! cache and runs to completion whatever happens to the view.
//!
//! Precompute is best effort. Failures are logged at `debug` and dropped;
//! the next explicit read retries naturally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{AggregateSource, SharedCache};

struct ArmedTimer {
    handle: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

impl ArmedTimer {
    fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }
}

struct SchedulerState {
    timer: Mutex<Option<ArmedTimer>>,
    precomputing: watch::Sender<bool>,
}

impl SchedulerState {
    fn new() -> Self {
        let (precomputing, _) = watch::channel(false);
        Self {
            timer: Mutex::new(None),
            precomputing,
        }
    }

    fn timer(&self) -> MutexGuard<'_, Option<ArmedTimer>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the precomputing flag when the warm-up finishes or is dropped.
struct PrecomputingGuard(Arc<SchedulerState>);

impl PrecomputingGuard {
    fn engage(state: Arc<SchedulerState>) -> Self {
        state.precomputing.send_replace(true);
        Self(state)
    }
}

impl Drop for PrecomputingGuard {
    fn drop(&mut self) {
        self.0.precomputing.send_replace(false);
    }
}

/// One-shot deferred warm-up for a single [`SharedCache`].
///
/// Idempotent: while a timer is armed, or the warm-up it fired is still
/// running, further calls to [`schedule`](Self::schedule) do nothing.
/// Clones share the same timer.
pub struct PrecomputeScheduler<S: AggregateSource> {
    cache: SharedCache<S>,
    state: Arc<SchedulerState>,
}

impl<S: AggregateSource> PrecomputeScheduler<S> {
    pub fn new(cache: SharedCache<S>) -> Self {
        Self {
            cache,
            state: Arc::new(SchedulerState::new()),
        }
    }

    pub fn cache(&self) -> &SharedCache<S> {
        &self.cache
    }

    /// Arm a warm-up that fires after `delay`.
    ///
    /// Returns `false` when a timer or warm-up is already pending.
    pub fn schedule(&self, delay: Duration) -> bool {
        let mut slot = self.state.timer();
        if slot.as_ref().is_some_and(ArmedTimer::is_pending) {
            debug!(kind = %self.cache.kind(), "Precompute already scheduled");
            return false;
        }

        let fired = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_precompute(
            self.cache.clone(),
            Arc::clone(&self.state),
            Arc::clone(&fired),
            delay,
        ));
        *slot = Some(ArmedTimer { handle, fired });
        debug!(
            kind = %self.cache.kind(),
            delay_ms = delay.as_millis() as u64,
            "Precompute scheduled"
        );
        true
    }

    /// Arm a warm-up using the cache policy's precompute delay.
    pub fn schedule_default(&self) -> bool {
        self.schedule(self.cache.policy().precompute_delay)
    }

    /// Cancel a timer that has not fired yet.
    ///
    /// Returns `true` if a pending timer was cancelled. A warm-up that has
    /// already started is left to finish.
    pub fn cancel(&self) -> bool {
        let mut slot = self.state.timer();
        let Some(timer) = slot.take() else {
            return false;
        };
        if !timer.is_pending() {
            return false;
        }
        if timer.fired.load(Ordering::SeqCst) {
            // Put it back so schedule() stays idempotent until it finishes.
            *slot = Some(timer);
            return false;
        }
        timer.handle.abort();
        debug!(kind = %self.cache.kind(), "Precompute cancelled");
        true
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.state
            .timer()
            .as_ref()
            .is_some_and(|t| t.is_pending() && !t.fired.load(Ordering::SeqCst))
    }

    /// Whether a warm-up fetch started by this scheduler is running.
    pub fn is_precomputing(&self) -> bool {
        *self.state.precomputing.borrow()
    }

    /// Follow [`is_precomputing`](Self::is_precomputing) as it changes.
    ///
    /// The current value is marked seen, so `changed()` resolves on the
    /// next transition.
    pub fn watch_precomputing(&self) -> watch::Receiver<bool> {
        self.state.precomputing.subscribe()
    }
}

impl<S: AggregateSource> Clone for PrecomputeScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

async fn run_precompute<S: AggregateSource>(
    cache: SharedCache<S>,
    state: Arc<SchedulerState>,
    fired: Arc<AtomicBool>,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;
    fired.store(true, Ordering::SeqCst);

    if cache.is_valid_now() {
        debug!(kind = %cache.kind(), "Precompute skipped, cache already valid");
        return;
    }
    if cache.is_fetching() {
        debug!(kind = %cache.kind(), "Precompute skipped, fetch already in flight");
        return;
    }

    let _guard = PrecomputingGuard::engage(state);
    match cache.get(false).await {
        Ok(_) => debug!(kind = %cache.kind(), "Precompute completed"),
        Err(err) => debug!(kind = %cache.kind(), error = %err, "Precompute failed, ignoring"),
    }
}
