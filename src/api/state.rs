use std::sync::Arc;

use crate::detect::engine::AnomalyDetector;
use crate::heal::RemediationEngine;
use crate::storage::MetricStore;

#[derive(Clone)]
pub struct AppState {
    pub store: MetricStore,
    pub detector: AnomalyDetector,
    pub engine: Arc<RemediationEngine>,
}
