//! Periodic at-risk alert polling.

use crate::api_client::AnalyticsBackend;
use cohort_core::AlertList;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertState {
    pub alerts: Option<AlertList>,
    pub error: Option<String>,
    /// Completed polls, successful or not.
    pub polls: u64,
}

/// Repeating alert fetch bound to the lifetime of the screen that shows it.
///
/// Polls immediately, then every `every`. Ticks missed while a slow request
/// was outstanding are skipped rather than bunched up. After
/// [`stop`](Self::stop) returns no further state is published.
pub struct AlertPoller {
    live: Arc<Mutex<bool>>,
    shutdown: watch::Sender<bool>,
    rx: watch::Receiver<AlertState>,
    handle: JoinHandle<()>,
}

impl AlertPoller {
    pub fn start(
        backend: Arc<dyn AnalyticsBackend>,
        every: Duration,
        min_consecutive: u32,
    ) -> Self {
        let live = Arc::new(Mutex::new(true));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (tx, rx) = watch::channel(AlertState::default());
        let handle = tokio::spawn(poll_alerts(
            backend,
            every,
            min_consecutive,
            Arc::clone(&live),
            tx,
            shutdown_rx,
        ));
        info!(every_ms = every.as_millis() as u64, min_consecutive, "Alert poller started");
        Self {
            live,
            shutdown,
            rx,
            handle,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AlertState> {
        self.rx.clone()
    }

    pub fn state(&self) -> AlertState {
        self.rx.borrow().clone()
    }

    pub fn stop(&self) {
        let mut live = self.live.lock().unwrap_or_else(|p| p.into_inner());
        if *live {
            *live = false;
            self.shutdown.send_replace(true);
            debug!("Alert poller stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AlertPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_alerts(
    backend: Arc<dyn AnalyticsBackend>,
    every: Duration,
    min_consecutive: u32,
    live: Arc<Mutex<bool>>,
    tx: watch::Sender<AlertState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let outcome = backend.alerts(min_consecutive).await;

                let gate = live.lock().unwrap_or_else(|p| p.into_inner());
                if !*gate {
                    break;
                }
                tx.send_modify(|state| {
                    match outcome {
                        Ok(alerts) => {
                            debug!(count = alerts.count, "Alerts polled");
                            state.alerts = Some(alerts);
                            state.error = None;
                        }
                        Err(err) => {
                            warn!(error = %err, "Alert poll failed");
                            state.error = Some(err.to_string());
                        }
                    }
                    state.polls += 1;
                });
            }
        }
    }
    info!("Alert poller stopped");
}
