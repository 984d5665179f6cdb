//! Session-scoped wiring of caches, bus and schedulers.

use crate::api_client::{AnalyticsBackend, RestClient};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mutations::MutationService;
use crate::poller::AlertPoller;
use crate::sources::{BackendSource, ClustersSource, DashboardSource, RankingsSource};
use crate::views::{ClusterView, DashboardView, ListView, PredictionHistoryQuery};
use cohort_cache::{InvalidationPolicy, PrecomputeScheduler, SharedCache};
use cohort_core::CachePolicy;
use cohort_events::{InvalidationBus, InvalidationEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything shared by the screens of one client session.
///
/// Exactly one cache exists per aggregate kind. The clustering cache is
/// invalidated only by retraining; rankings and dashboard statistics are
/// derived from prediction rows and go stale whenever those change. A
/// mounted dashboard view also reloads its statistics on those changes.
pub struct AnalyticsSession {
    backend: Arc<dyn AnalyticsBackend>,
    bus: InvalidationBus,
    clusters: SharedCache<ClustersSource>,
    rankings: SharedCache<RankingsSource>,
    dashboard: SharedCache<DashboardSource>,
    clusters_precompute: PrecomputeScheduler<ClustersSource>,
    _invalidation: Vec<InvalidationPolicy>,
}

impl AnalyticsSession {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, policy: CachePolicy) -> Self {
        let bus = InvalidationBus::new();
        let clusters = SharedCache::new(BackendSource::new(Arc::clone(&backend)), policy);
        let rankings = SharedCache::new(BackendSource::new(Arc::clone(&backend)), policy);
        let dashboard = SharedCache::new(BackendSource::new(Arc::clone(&backend)), policy);

        let invalidation = vec![
            InvalidationPolicy::for_clusters(&bus, &clusters),
            InvalidationPolicy::on_events(&bus, &rankings, &InvalidationEvent::PREDICTION_CHANGES),
            InvalidationPolicy::on_events(&bus, &dashboard, &InvalidationEvent::PREDICTION_CHANGES),
        ];
        let clusters_precompute = PrecomputeScheduler::new(clusters.clone());

        info!(
            validity_window_secs = policy.validity_window.as_secs(),
            precompute_delay_ms = policy.precompute_delay.as_millis() as u64,
            "Analytics session ready"
        );
        Self {
            backend,
            bus,
            clusters,
            rankings,
            dashboard,
            clusters_precompute,
            _invalidation: invalidation,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let rest = RestClient::new(config)?;
        Ok(Self::new(Arc::new(rest), config.cache_policy()))
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn backend(&self) -> Arc<dyn AnalyticsBackend> {
        Arc::clone(&self.backend)
    }

    pub fn clusters(&self) -> &SharedCache<ClustersSource> {
        &self.clusters
    }

    pub fn rankings(&self) -> &SharedCache<RankingsSource> {
        &self.rankings
    }

    pub fn dashboard(&self) -> &SharedCache<DashboardSource> {
        &self.dashboard
    }

    pub fn clusters_precompute(&self) -> &PrecomputeScheduler<ClustersSource> {
        &self.clusters_precompute
    }

    pub fn mutations(&self) -> MutationService {
        MutationService::new(self.backend(), self.bus.clone())
    }

    pub fn cluster_view(&self) -> ClusterView {
        ClusterView::new(self.clusters.clone(), self.clusters_precompute.clone())
    }

    pub fn dashboard_view(&self) -> DashboardView {
        DashboardView::new(
            &self.bus,
            self.dashboard.clone(),
            self.clusters_precompute.clone(),
        )
    }

    pub fn prediction_history(&self, page: u32, limit: u32) -> ListView<PredictionHistoryQuery> {
        ListView::new(
            &self.bus,
            PredictionHistoryQuery::new(self.backend(), page, limit),
        )
    }

    pub fn alert_poller(&self, every: Duration, min_consecutive: u32) -> AlertPoller {
        AlertPoller::start(self.backend(), every, min_consecutive)
    }
}
