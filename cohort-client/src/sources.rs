//! Backend-backed aggregate sources for the shared caches.

use crate::api_client::AnalyticsBackend;
use async_trait::async_trait;
use cohort_cache::AggregateSource;
use cohort_core::{AggregateKind, DashboardStats, FetchError, Rankings, StudentClusters};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A payload type served by one aggregate endpoint.
pub trait AggregatePayload: DeserializeOwned + Send + Sync + 'static {
    const KIND: AggregateKind;
}

impl AggregatePayload for StudentClusters {
    const KIND: AggregateKind = AggregateKind::StudentClusters;
}

impl AggregatePayload for Rankings {
    const KIND: AggregateKind = AggregateKind::Rankings;
}

impl AggregatePayload for DashboardStats {
    const KIND: AggregateKind = AggregateKind::DashboardStats;
}

/// Fetches and decodes one aggregate from the backend.
pub struct BackendSource<T> {
    backend: Arc<dyn AnalyticsBackend>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: AggregatePayload> BackendSource<T> {
    pub fn new(backend: Arc<dyn AnalyticsBackend>) -> Self {
        Self {
            backend,
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BackendSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSource")
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<T: AggregatePayload> AggregateSource for BackendSource<T> {
    type Output = T;

    fn kind(&self) -> AggregateKind {
        T::KIND
    }

    async fn compute(&self, force_refresh: bool) -> Result<T, FetchError> {
        let raw = self
            .backend
            .fetch_aggregate(T::KIND, force_refresh)
            .await
            .map_err(FetchError::from)?;
        debug!(kind = %T::KIND, force_refresh, "Decoding aggregate");
        serde_json::from_value(raw).map_err(|e| FetchError::Decode {
            reason: e.to_string(),
        })
    }
}

pub type ClustersSource = BackendSource<StudentClusters>;
pub type RankingsSource = BackendSource<Rankings>;
pub type DashboardSource = BackendSource<DashboardStats>;
