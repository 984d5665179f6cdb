//! COHORT client entry point.
//!
//! Loads the config, opens the clusters screen once and prints what it
//! shows.

use cohort_client::{AnalyticsSession, ClientConfig, ClientError};
use cohort_core::StudentClusters;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    init_tracing();

    let config = ClientConfig::load()?;
    let session = AnalyticsSession::from_config(&config)?;

    let view = session.cluster_view();
    if let Some(load) = view.activate() {
        if let Err(err) = load.await {
            warn!(error = %err, "Cluster view load task failed");
        }
    }

    let snapshot = view.snapshot();
    view.deactivate();
    match snapshot.data {
        Some(clusters) => {
            print_summary(&clusters);
            Ok(())
        }
        None => Err(ClientError::View(
            snapshot
                .error
                .unwrap_or_else(|| "no clustering data".to_string()),
        )),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cohort_client=info,cohort_cache=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_summary(clusters: &StudentClusters) {
    println!(
        "{} students in {} clusters (silhouette {:.3}, {})",
        clusters.total_students,
        clusters.optimal_k,
        clusters.validation.optimal_silhouette,
        clusters.validation.selection_method,
    );
    for card in &clusters.clusters {
        println!(
            "  #{:<2} {:>4} students  attendance {:>5.1}%  marks {:>5.1}  {}",
            card.cluster_id,
            card.student_count,
            card.avg_attendance,
            card.avg_marks,
            card.interpretation,
        );
    }
}
