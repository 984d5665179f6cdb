//! Wiring between invalidation events and shared caches.
//!
//! The clustering aggregate describes the population as a whole and is
//! recomputed only when the model changes. Prediction churn is deliberately
//! not a trigger: it would force an expensive recompute on every row edit.
//!
//! | Event               | Student clusters | Prediction lists |
//! |---------------------|------------------|------------------|
//! | `predictionCreated` | unchanged        | reload           |
//! | `predictionDeleted` | unchanged        | reload           |
//! | `modelTrained`      | marked stale     | unchanged        |

use cohort_events::{InvalidationBus, InvalidationEvent, Subscription};
use tracing::info;

use crate::cache::{AggregateSource, SharedCache};

/// Keeps a shared cache subscribed to the events that invalidate it.
///
/// The subscription lives as long as this value.
#[derive(Debug)]
pub struct InvalidationPolicy {
    subscriptions: Vec<Subscription>,
}

impl InvalidationPolicy {
    /// Mark `cache` stale on `modelTrained` only.
    ///
    /// Stale data stays readable through `peek`; the next `get` refetches.
    pub fn for_clusters<S: AggregateSource>(bus: &InvalidationBus, cache: &SharedCache<S>) -> Self {
        Self::on_events(bus, cache, &[InvalidationEvent::ModelTrained])
    }

    /// Mark `cache` stale whenever any of `events` is published.
    pub fn on_events<S: AggregateSource>(
        bus: &InvalidationBus,
        cache: &SharedCache<S>,
        events: &[InvalidationEvent],
    ) -> Self {
        let subscriptions = events
            .iter()
            .map(|&event| {
                let target = cache.clone();
                bus.subscribe(event, move || {
                    if target.mark_stale() {
                        info!(kind = %target.kind(), event = %event, "Cache invalidated");
                    }
                })
            })
            .collect();
        Self { subscriptions }
    }

    /// Events this policy is listening to.
    pub fn events(&self) -> Vec<InvalidationEvent> {
        self.subscriptions.iter().map(Subscription::event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cohort_core::{AggregateKind, CachePolicy, FetchError};

    struct Constant;

    #[async_trait]
    impl AggregateSource for Constant {
        type Output = &'static str;

        fn kind(&self) -> AggregateKind {
            AggregateKind::StudentClusters
        }

        async fn compute(&self, _force_refresh: bool) -> Result<&'static str, FetchError> {
            Ok("clusters")
        }
    }

    #[tokio::test]
    async fn test_prediction_events_leave_clusters_valid() {
        let bus = InvalidationBus::new();
        let cache = SharedCache::new(Constant, CachePolicy::default());
        let _policy = InvalidationPolicy::for_clusters(&bus, &cache);
        cache.get(false).await.unwrap();

        bus.publish(InvalidationEvent::PredictionCreated);
        bus.publish(InvalidationEvent::PredictionDeleted);
        assert!(cache.is_valid_now());

        bus.publish(InvalidationEvent::ModelTrained);
        assert!(!cache.is_valid_now());
        assert_eq!(cache.peek().as_deref(), Some(&"clusters"));
    }

    #[tokio::test]
    async fn test_dropping_policy_stops_invalidation() {
        let bus = InvalidationBus::new();
        let cache = SharedCache::new(Constant, CachePolicy::default());
        let policy = InvalidationPolicy::for_clusters(&bus, &cache);
        assert_eq!(policy.events(), vec![InvalidationEvent::ModelTrained]);
        cache.get(false).await.unwrap();

        drop(policy);
        bus.publish(InvalidationEvent::ModelTrained);
        assert!(cache.is_valid_now());
    }
}
