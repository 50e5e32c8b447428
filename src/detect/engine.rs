use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::DetectorConfig;
use crate::detect::{assess_window, AnomalyEvent, Assessment};
use crate::dispatch::Dispatcher;
use crate::storage::{MetricStore, StoreError};

/// Pulls the recent window from the store and classifies it.
///
/// Holds no state of its own between evaluations.
#[derive(Clone)]
pub struct AnomalyDetector {
    store: MetricStore,
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(store: MetricStore, config: DetectorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub async fn assess(&self, service: &str) -> Result<Assessment, StoreError> {
        let store = self.store.clone();
        let owned = service.to_string();
        let window = self.config.window_size;

        // Spawn blocking task for the DB query
        let samples =
            tokio::task::spawn_blocking(move || store.fetch_recent(&owned, window)).await??;

        Ok(assess_window(service, &samples, &self.config))
    }

    pub async fn evaluate(&self, service: &str) -> Result<Option<AnomalyEvent>, StoreError> {
        Ok(self.assess(service).await?.into_event())
    }
}

/// One detector cycle: assess, and hand any anomaly to the dispatcher.
///
/// Dispatch failures are logged and dropped.
pub async fn run_cycle(
    detector: &AnomalyDetector,
    service: &str,
    dispatcher: &dyn Dispatcher,
) -> Result<Assessment, StoreError> {
    let assessment = detector.assess(service).await?;

    match &assessment {
        Assessment::Anomalous(event) => {
            warn!(
                service = %event.service,
                kind = %event.kind,
                eta_min = event.eta_minutes,
                confidence = event.confidence,
                "{}",
                event.message
            );
            match dispatcher.send(event).await {
                Ok(ack) => info!(
                    service = %event.service,
                    kind = %event.kind,
                    status = %ack.status,
                    action = ?ack.action,
                    success = ?ack.success,
                    "Sent alert to healer"
                ),
                Err(e) => warn!(
                    service = %event.service,
                    kind = %event.kind,
                    "Failed to notify healer: {}",
                    e
                ),
            }
        }
        Assessment::Healthy => info!(service = %service, "System stable"),
        Assessment::InsufficientData { have, needed } => {
            debug!(service = %service, have, needed, "Not enough samples to assess yet")
        }
    }

    Ok(assessment)
}

/// Detector loop. Runs until the task is aborted; a failed cycle never ends it.
pub async fn run_detector_loop(
    detector: AnomalyDetector,
    service: String,
    dispatcher: Arc<dyn Dispatcher>,
    every: Duration,
) {
    info!(
        service = %service,
        window = detector.config.window_size,
        interval_secs = every.as_secs(),
        "Predictor started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let Err(e) = run_cycle(&detector, &service, dispatcher.as_ref()).await {
            error!(service = %service, "Detector cycle failed: {}", e);
        }
    }
}
