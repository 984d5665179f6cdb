//! Per-consumer adapter between a shared cache and one view's lifecycle.
//!
//! A binding exposes `{ data, loading, error, is_precomputing }` for a single
//! mounted consumer and guarantees that once it is deactivated no further
//! state reaches that consumer, even if a fetch it triggered resolves later.
//!
//! ```text
//! Idle ──activate──▶ Loading ──ok──▶ Ready ──refresh──▶ Loading
//!                       │                                  │
//!                       └──err──▶ Error ◀──────err─────────┘
//!
//! any state ──deactivate──▶ Detached (terminal)
//! ```
//!
//! The liveness flag is checked under the state lock immediately before
//! every write, and [`deactivate`](CacheConsumerBinding::deactivate) flips
//! it under the same lock, so a write either happens before deactivation
//! returns or not at all.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cache::{AggregateSource, SharedCache};
use crate::precompute::PrecomputeScheduler;

/// Lifecycle phase of one consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
    Detached,
}

/// State exposed to rendering code.
#[derive(Debug)]
pub struct ConsumerSnapshot<T> {
    /// Current value, possibly stale while a refresh runs.
    pub data: Option<Arc<T>>,
    pub phase: ConsumerPhase,
    /// Message of the last failed fetch, cleared by the next success.
    pub error: Option<String>,
    /// A background warm-up for this aggregate is in progress.
    pub is_precomputing: bool,
}

impl<T> ConsumerSnapshot<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            phase: ConsumerPhase::Idle,
            error: None,
            is_precomputing: false,
        }
    }

    pub fn loading(&self) -> bool {
        self.phase == ConsumerPhase::Loading
    }
}

impl<T> Default for ConsumerSnapshot<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> Clone for ConsumerSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            phase: self.phase,
            error: self.error.clone(),
            is_precomputing: self.is_precomputing,
        }
    }
}

/// Receives every state transition of a live binding.
pub trait StateSink<T>: Send + Sync + 'static {
    fn apply(&self, snapshot: &ConsumerSnapshot<T>);
}

impl<T: Send + Sync + 'static> StateSink<T> for watch::Sender<ConsumerSnapshot<T>> {
    fn apply(&self, snapshot: &ConsumerSnapshot<T>) {
        self.send_replace(snapshot.clone());
    }
}

struct BindingInner<S: AggregateSource> {
    cache: SharedCache<S>,
    scheduler: Option<PrecomputeScheduler<S>>,
    live: AtomicBool,
    state: Mutex<ConsumerSnapshot<S::Output>>,
    sink: Box<dyn StateSink<S::Output>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl<S: AggregateSource> BindingInner<S> {
    fn state(&self) -> MutexGuard<'_, ConsumerSnapshot<S::Output>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn precomputing(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(PrecomputeScheduler::is_precomputing)
    }

    /// Apply `update` and publish it, unless the consumer has detached.
    fn write<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut ConsumerSnapshot<S::Output>),
    {
        let mut state = self.state();
        if !self.is_live() {
            trace!(kind = %self.cache.kind(), "Suppressed write to detached consumer");
            return false;
        }
        update(&mut state);
        state.is_precomputing = self.precomputing();
        self.sink.apply(&state);
        true
    }

    /// Publish a warm-up start or finish without touching anything else.
    fn write_precomputing(&self, precomputing: bool) -> bool {
        let mut state = self.state();
        if !self.is_live() {
            return false;
        }
        if state.is_precomputing != precomputing {
            state.is_precomputing = precomputing;
            self.sink.apply(&state);
        }
        true
    }

    fn forwarder(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.forwarder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn validate(&self) {
        match self.cache.get(false).await {
            Ok(value) => {
                self.write(|s| {
                    s.data = Some(value);
                    s.phase = ConsumerPhase::Ready;
                    s.error = None;
                });
            }
            Err(err) => {
                let message = err.to_string();
                self.write(|s| {
                    if s.data.is_some() {
                        // Stale data stays on screen; only explicit refreshes
                        // surface errors over existing data.
                        warn!(
                            kind = %self.cache.kind(),
                            error = %message,
                            "Background revalidation failed"
                        );
                        s.phase = ConsumerPhase::Ready;
                    } else {
                        s.phase = ConsumerPhase::Error;
                        s.error = Some(message);
                    }
                });
            }
        }
    }
}

/// Binds one consumer to a [`SharedCache`].
///
/// Dropping the binding deactivates it.
pub struct CacheConsumerBinding<S: AggregateSource> {
    inner: Arc<BindingInner<S>>,
}

impl<S: AggregateSource> CacheConsumerBinding<S> {
    pub fn new(cache: SharedCache<S>, sink: impl StateSink<S::Output>) -> Self {
        Self::build(cache, None, Box::new(sink))
    }

    /// A binding that also reports the scheduler's warm-up activity.
    pub fn with_precompute(
        cache: SharedCache<S>,
        scheduler: PrecomputeScheduler<S>,
        sink: impl StateSink<S::Output>,
    ) -> Self {
        Self::build(cache, Some(scheduler), Box::new(sink))
    }

    /// A binding publishing into a watch channel, plus its receiver.
    pub fn watched(
        cache: SharedCache<S>,
    ) -> (Self, watch::Receiver<ConsumerSnapshot<S::Output>>) {
        let (tx, rx) = watch::channel(ConsumerSnapshot::idle());
        (Self::new(cache, tx), rx)
    }

    fn build(
        cache: SharedCache<S>,
        scheduler: Option<PrecomputeScheduler<S>>,
        sink: Box<dyn StateSink<S::Output>>,
    ) -> Self {
        Self {
            inner: Arc::new(BindingInner {
                cache,
                scheduler,
                live: AtomicBool::new(true),
                state: Mutex::new(ConsumerSnapshot::idle()),
                sink,
                forwarder: Mutex::new(None),
            }),
        }
    }

    /// Mount: show cached data immediately if any, and revalidate it in
    /// the background.
    ///
    /// Returns the revalidation task, or `None` if already detached.
    pub fn activate(&self) -> Option<JoinHandle<()>> {
        if !self.inner.is_live() {
            return None;
        }
        self.follow_precompute();

        match self.inner.cache.peek() {
            Some(cached) => {
                self.inner.write(|s| {
                    s.data = Some(cached);
                    s.phase = ConsumerPhase::Ready;
                    s.error = None;
                });
            }
            None => {
                self.inner.write(|s| s.phase = ConsumerPhase::Loading);
            }
        }
        debug!(kind = %self.inner.cache.kind(), "Consumer activated");

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move { inner.validate().await }))
    }

    /// Forward the scheduler's warm-up transitions to the sink.
    fn follow_precompute(&self) {
        let Some(scheduler) = &self.inner.scheduler else {
            return;
        };
        let mut forwarder = self.inner.forwarder();
        if forwarder.is_some() {
            return;
        }
        let flag = scheduler.watch_precomputing();
        let inner = Arc::downgrade(&self.inner);
        *forwarder = Some(tokio::spawn(forward_precomputing(inner, flag)));
    }

    /// Force a fetch (joining any in flight) and expose its outcome.
    pub async fn refresh(&self) {
        if !self.inner.is_live() {
            return;
        }
        self.inner.write(|s| {
            s.phase = ConsumerPhase::Loading;
            s.error = None;
        });

        match self.inner.cache.get(true).await {
            Ok(value) => {
                self.inner.write(|s| {
                    s.data = Some(value);
                    s.phase = ConsumerPhase::Ready;
                });
            }
            Err(err) => {
                let message = err.to_string();
                self.inner.write(|s| {
                    s.phase = ConsumerPhase::Error;
                    s.error = Some(message);
                });
            }
        }
    }

    /// Unmount. Terminal: no state transition is applied afterwards.
    pub fn deactivate(&self) {
        {
            let _state = self.inner.state();
            if self.inner.live.swap(false, Ordering::SeqCst) {
                debug!(kind = %self.inner.cache.kind(), "Consumer detached");
            }
        }
        if let Some(forwarder) = self.inner.forwarder().take() {
            forwarder.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_live()
    }

    pub fn phase(&self) -> ConsumerPhase {
        if !self.inner.is_live() {
            return ConsumerPhase::Detached;
        }
        self.inner.state().phase
    }

    /// Current exposed state, with a live precompute flag.
    pub fn snapshot(&self) -> ConsumerSnapshot<S::Output> {
        let mut snapshot = self.inner.state().clone();
        if !self.inner.is_live() {
            snapshot.phase = ConsumerPhase::Detached;
        }
        snapshot.is_precomputing = self.inner.precomputing();
        snapshot
    }

    pub fn cache(&self) -> &SharedCache<S> {
        &self.inner.cache
    }
}

async fn forward_precomputing<S: AggregateSource>(
    inner: Weak<BindingInner<S>>,
    mut flag: watch::Receiver<bool>,
) {
    while flag.changed().await.is_ok() {
        let precomputing = *flag.borrow_and_update();
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.write_precomputing(precomputing) {
            break;
        }
        trace!(kind = %inner.cache.kind(), precomputing, "Precompute state forwarded");
    }
}

impl<S: AggregateSource> Drop for CacheConsumerBinding<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<S: AggregateSource> fmt::Debug for CacheConsumerBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConsumerBinding")
            .field("kind", &self.inner.cache.kind())
            .field("phase", &self.phase())
            .finish()
    }
}
