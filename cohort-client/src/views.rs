//! View controllers.
//!
//! Views never render anything themselves; they own the state a renderer
//! reads through a `watch::Receiver` and follow the mount/unmount lifecycle
//! of the screen they back.

use crate::api_client::AnalyticsBackend;
use crate::sources::{ClustersSource, DashboardSource};
use async_trait::async_trait;
use cohort_cache::{
    AggregateSource, CacheConsumerBinding, ConsumerPhase, ConsumerSnapshot, PrecomputeScheduler,
    SharedCache,
};
use cohort_core::{DashboardStats, FetchError, PredictionPage, StudentClusters};
use cohort_events::{InvalidationBus, InvalidationEvent, Subscription};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

// ============================================================================
// LIST VIEWS
// ============================================================================

/// A cheap query re-run whenever prediction rows change.
#[async_trait]
pub trait ListQuery: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    async fn load(&self) -> Result<Self::Output, FetchError>;
}

/// One page of the prediction history table.
pub struct PredictionHistoryQuery {
    backend: Arc<dyn AnalyticsBackend>,
    page: u32,
    limit: u32,
}

impl PredictionHistoryQuery {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, page: u32, limit: u32) -> Self {
        Self {
            backend,
            page: page.max(1),
            limit,
        }
    }
}

#[async_trait]
impl ListQuery for PredictionHistoryQuery {
    type Output = PredictionPage;

    async fn load(&self) -> Result<PredictionPage, FetchError> {
        self.backend
            .list_predictions(self.page, self.limit)
            .await
            .map_err(FetchError::from)
    }
}

#[derive(Debug)]
pub struct ListState<T> {
    pub items: Option<Arc<T>>,
    pub loading: bool,
    pub error: Option<String>,
    /// Completed loads, successful or not.
    pub loads: u64,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: None,
            loading: false,
            error: None,
            loads: 0,
        }
    }
}

impl<T> Clone for ListState<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            loading: self.loading,
            error: self.error.clone(),
            loads: self.loads,
        }
    }
}

struct ListInner<Q: ListQuery> {
    query: Q,
    live: AtomicBool,
    requested: AtomicU64,
    state: Mutex<ListState<Q::Output>>,
    tx: watch::Sender<ListState<Q::Output>>,
}

impl<Q: ListQuery> ListInner<Q> {
    fn state(&self) -> MutexGuard<'_, ListState<Q::Output>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut ListState<Q::Output>),
    {
        let mut state = self.state();
        if !self.live.load(Ordering::SeqCst) {
            trace!("Suppressed write to detached list view");
            return false;
        }
        update(&mut state);
        self.tx.send_replace(state.clone());
        true
    }

    async fn reload(&self) {
        if !self.live.load(Ordering::SeqCst) {
            return;
        }
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        self.write(|s| s.loading = true);

        let outcome = self.query.load().await;

        // Only the newest request may land; older ones finished out of order.
        if self.requested.load(Ordering::SeqCst) != ticket {
            trace!(ticket, "Discarding superseded list load");
            return;
        }
        self.write(|s| {
            match outcome {
                Ok(items) => {
                    s.items = Some(Arc::new(items));
                    s.error = None;
                }
                Err(err) => {
                    warn!(error = %err, "List load failed");
                    s.error = Some(err.to_string());
                }
            }
            s.loading = false;
            s.loads += 1;
        });
    }
}

/// A list that reloads on every prediction change.
///
/// List queries are cheap, so there is no cache: each `predictionCreated`
/// or `predictionDeleted` triggers a reload. Dropping the view unsubscribes
/// and stops all writes.
pub struct ListView<Q: ListQuery> {
    inner: Arc<ListInner<Q>>,
    rx: watch::Receiver<ListState<Q::Output>>,
    _subscriptions: Vec<Subscription>,
}

impl<Q: ListQuery> ListView<Q> {
    /// Must be called from within a tokio runtime; reloads are spawned on it.
    pub fn new(bus: &InvalidationBus, query: Q) -> Self {
        let (tx, rx) = watch::channel(ListState::default());
        let inner = Arc::new(ListInner {
            query,
            live: AtomicBool::new(true),
            requested: AtomicU64::new(0),
            state: Mutex::new(ListState::default()),
            tx,
        });

        let runtime = Handle::try_current().ok();
        let weak = Arc::downgrade(&inner);
        let subscriptions =
            bus.subscribe_many(&InvalidationEvent::PREDICTION_CHANGES, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match &runtime {
                    Some(handle) => {
                        handle.spawn(async move { inner.reload().await });
                    }
                    None => warn!("List view built outside a runtime, skipping reload"),
                }
            });

        Self {
            inner,
            rx,
            _subscriptions: subscriptions,
        }
    }

    /// Initial load on mount.
    pub fn activate(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.reload().await })
    }

    /// Reload now and wait for it.
    pub async fn reload(&self) {
        self.inner.reload().await;
    }

    pub fn deactivate(&self) {
        let _state = self.inner.state();
        if self.inner.live.swap(false, Ordering::SeqCst) {
            debug!("List view detached");
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState<Q::Output>> {
        self.rx.clone()
    }

    pub fn state(&self) -> ListState<Q::Output> {
        self.rx.borrow().clone()
    }
}

impl<Q: ListQuery> Drop for ListView<Q> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ============================================================================
// CLUSTER VIEW
// ============================================================================

/// The behavioural-clusters screen.
///
/// Reads through the shared clustering cache. Prediction churn does not
/// touch it; the user refreshes explicitly.
pub struct ClusterView<S = ClustersSource>
where
    S: AggregateSource<Output = StudentClusters>,
{
    binding: CacheConsumerBinding<S>,
    rx: watch::Receiver<ConsumerSnapshot<StudentClusters>>,
}

impl<S: AggregateSource<Output = StudentClusters>> ClusterView<S> {
    pub fn new(cache: SharedCache<S>, scheduler: PrecomputeScheduler<S>) -> Self {
        let (tx, rx) = watch::channel(ConsumerSnapshot::idle());
        Self {
            binding: CacheConsumerBinding::with_precompute(cache, scheduler, tx),
            rx,
        }
    }

    pub fn activate(&self) -> Option<JoinHandle<()>> {
        self.binding.activate()
    }

    pub async fn refresh(&self) {
        self.binding.refresh().await;
    }

    pub fn deactivate(&self) {
        self.binding.deactivate();
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerSnapshot<StudentClusters>> {
        self.rx.clone()
    }

    pub fn snapshot(&self) -> ConsumerSnapshot<StudentClusters> {
        self.binding.snapshot()
    }
}

// ============================================================================
// DASHBOARD VIEW
// ============================================================================

/// The teacher dashboard.
///
/// Its statistics carry the recent-predictions list, so like the other
/// lists it reloads on every prediction change while mounted. Since the
/// user is likely to open the clusters screen next, it also warms the
/// clustering cache in the background. Leaving the dashboard before the
/// warm-up fires cancels it.
pub struct DashboardView<D = DashboardSource, C = ClustersSource>
where
    D: AggregateSource<Output = DashboardStats>,
    C: AggregateSource<Output = StudentClusters>,
{
    stats: Arc<CacheConsumerBinding<D>>,
    rx: watch::Receiver<ConsumerSnapshot<DashboardStats>>,
    clusters_precompute: PrecomputeScheduler<C>,
    armed: AtomicBool,
    _subscriptions: Vec<Subscription>,
}

impl<D, C> DashboardView<D, C>
where
    D: AggregateSource<Output = DashboardStats>,
    C: AggregateSource<Output = StudentClusters>,
{
    /// Must be called from within a tokio runtime; reloads are spawned on it.
    pub fn new(
        bus: &InvalidationBus,
        stats: SharedCache<D>,
        clusters_precompute: PrecomputeScheduler<C>,
    ) -> Self {
        let (tx, rx) = watch::channel(ConsumerSnapshot::idle());
        let stats = Arc::new(CacheConsumerBinding::new(stats, tx));

        let runtime = Handle::try_current().ok();
        let weak = Arc::downgrade(&stats);
        let subscriptions =
            bus.subscribe_many(&InvalidationEvent::PREDICTION_CHANGES, move || {
                let Some(stats) = weak.upgrade() else {
                    return;
                };
                // Not mounted yet, or already left.
                if matches!(stats.phase(), ConsumerPhase::Idle | ConsumerPhase::Detached) {
                    return;
                }
                match &runtime {
                    Some(handle) => {
                        handle.spawn(async move { stats.refresh().await });
                    }
                    None => warn!("Dashboard view built outside a runtime, skipping reload"),
                }
            });

        Self {
            stats,
            rx,
            clusters_precompute,
            armed: AtomicBool::new(false),
            _subscriptions: subscriptions,
        }
    }

    pub fn activate(&self) -> Option<JoinHandle<()>> {
        let task = self.stats.activate()?;
        if self.clusters_precompute.schedule_default() {
            self.armed.store(true, Ordering::SeqCst);
        }
        Some(task)
    }

    pub async fn refresh(&self) {
        self.stats.refresh().await;
    }

    pub fn deactivate(&self) {
        self.stats.deactivate();
        if self.armed.swap(false, Ordering::SeqCst) {
            self.clusters_precompute.cancel();
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerSnapshot<DashboardStats>> {
        self.rx.clone()
    }

    pub fn snapshot(&self) -> ConsumerSnapshot<DashboardStats> {
        self.stats.snapshot()
    }
}

impl<D, C> Drop for DashboardView<D, C>
where
    D: AggregateSource<Output = DashboardStats>,
    C: AggregateSource<Output = StudentClusters>,
{
    fn drop(&mut self) {
        self.deactivate();
    }
}
