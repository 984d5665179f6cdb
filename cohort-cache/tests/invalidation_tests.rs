//! Event-driven invalidation and the end-to-end clustering timeline.

use cohort_cache::{InvalidationPolicy, SharedCache};
use cohort_core::{AggregateKind, CachePolicy, StudentClusters};
use cohort_events::{InvalidationBus, InvalidationEvent};
use cohort_test_utils::fixtures::{cluster_labels, clusters_labelled};
use cohort_test_utils::ScriptedSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::advance;

fn clusters_cache() -> SharedCache<ScriptedSource<StudentClusters>> {
    SharedCache::new(
        ScriptedSource::new(AggregateKind::StudentClusters)
            .then_ok(clusters_labelled(&["A", "B", "C"]))
            .then_ok(clusters_labelled(&["A", "B", "D"])),
        CachePolicy::default().with_validity_window(Duration::from_secs(300)),
    )
}

#[tokio::test]
async fn test_prediction_events_reload_lists_but_not_clusters() {
    let bus = InvalidationBus::new();
    let cache = clusters_cache();
    let _policy = InvalidationPolicy::for_clusters(&bus, &cache);

    let reloads = Arc::new(AtomicUsize::new(0));
    let _list = bus.subscribe_many(&InvalidationEvent::PREDICTION_CHANGES, {
        let reloads = Arc::clone(&reloads);
        move || {
            reloads.fetch_add(1, Ordering::SeqCst);
        }
    });

    cache.get(false).await.unwrap();

    bus.publish(InvalidationEvent::PredictionCreated);
    bus.publish(InvalidationEvent::PredictionDeleted);
    assert_eq!(reloads.load(Ordering::SeqCst), 2);
    assert!(cache.is_valid_now());
    cache.get(false).await.unwrap();
    assert_eq!(cache.source().calls(), 1);

    bus.publish(InvalidationEvent::ModelTrained);
    assert_eq!(reloads.load(Ordering::SeqCst), 2);
    assert!(!cache.is_valid_now());

    let refetched = cache.get(false).await.unwrap();
    assert_eq!(cluster_labels(&refetched), vec!["A", "B", "D"]);
    assert_eq!(cache.source().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clustering_timeline() {
    let bus = InvalidationBus::new();
    let cache = clusters_cache();
    let _policy = InvalidationPolicy::for_clusters(&bus, &cache);

    // t=0: first visit fetches.
    let first = cache.get(false).await.unwrap();
    assert_eq!(cluster_labels(&first), vec!["A", "B", "C"]);

    // t=100: a new prediction is created; clusters are not touched.
    advance(Duration::from_secs(100)).await;
    bus.publish(InvalidationEvent::PredictionCreated);
    let again = cache.get(false).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(cache.source().calls(), 1);

    // t=100: explicit refresh recomputes.
    let refreshed = cache.get(true).await.unwrap();
    assert_eq!(cluster_labels(&refreshed), vec!["A", "B", "D"]);
    assert_eq!(cache.source().forced_calls(), 1);

    // t=399: still inside the window of the refreshed entry.
    advance(Duration::from_secs(299)).await;
    cache.get(false).await.unwrap();
    assert_eq!(cache.source().calls(), 2);

    // t=401: expired, the next read fetches again.
    advance(Duration::from_secs(2)).await;
    cache.get(false).await.unwrap();
    assert_eq!(cache.source().calls(), 3);
    assert_eq!(cache.source().forced_calls(), 1);
}
