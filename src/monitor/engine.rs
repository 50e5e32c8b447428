use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::monitor::{HttpSampler, Sample};
use crate::storage::{MetricStore, StoreError};

/// Take one sample and append it to the store.
pub async fn poll_once(sampler: &HttpSampler, store: &MetricStore) -> Result<Sample, StoreError> {
    let sample = sampler.sample_once().await;

    let store = store.clone();
    let to_write = sample.clone();
    tokio::task::spawn_blocking(move || store.append(&to_write)).await??;

    Ok(sample)
}

/// Sampler loop. Runs until the task is aborted; a failed cycle never ends it.
pub async fn run_monitor_loop(sampler: Arc<HttpSampler>, store: MetricStore, every: Duration) {
    info!(
        service = %sampler.service(),
        target = %sampler.target(),
        interval_secs = every.as_secs(),
        "Monitor started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let Err(e) = poll_once(&sampler, &store).await {
            error!(service = %sampler.service(), "Failed to store sample: {}", e);
        }
    }
}
