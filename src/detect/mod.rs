//! Anomaly detection over the recent sample window.
//!
//! Each evaluation is a pure function of the last N samples of one service:
//! summary statistics are computed from scratch and matched against an ordered
//! rule table, first match wins.

pub mod anomaly;
pub mod engine;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::monitor::Sample;

use self::anomaly::WindowStats;

/// Fewest samples a window may hold and still be assessed.
pub const MIN_SAMPLES: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("insufficient data: need {needed} samples, have {have}")]
    InsufficientData { needed: usize, have: usize },
}

/// Classification produced by the detector.
///
/// Kinds arriving over the wire that this build does not know are kept
/// verbatim in `Other`, so a healer can still record them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnomalyKind {
    ApiFailureSpike,
    ApiLatencyIncrease,
    GradualSlowdown,
    Other(String),
}

impl AnomalyKind {
    pub fn as_str(&self) -> &str {
        match self {
            AnomalyKind::ApiFailureSpike => "api_failure_spike",
            AnomalyKind::ApiLatencyIncrease => "api_latency_increase",
            AnomalyKind::GradualSlowdown => "gradual_slowdown",
            AnomalyKind::Other(s) => s,
        }
    }
}

impl From<String> for AnomalyKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "api_failure_spike" => AnomalyKind::ApiFailureSpike,
            "api_latency_increase" => AnomalyKind::ApiLatencyIncrease,
            "gradual_slowdown" => AnomalyKind::GradualSlowdown,
            _ => AnomalyKind::Other(s),
        }
    }
}

impl From<&str> for AnomalyKind {
    fn from(s: &str) -> Self {
        AnomalyKind::from(s.to_string())
    }
}

impl From<AnomalyKind> for String {
    fn from(kind: AnomalyKind) -> Self {
        match kind {
            AnomalyKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn no_detail() -> String {
    "No detail".to_string()
}

/// A predictive event raised for one service.
///
/// Serialized with the field names the healer endpoint has always accepted:
/// `{service, type, eta_min, confidence, detail}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub service: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Estimated minutes until user-visible impact.
    #[serde(rename = "eta_min", default)]
    pub eta_minutes: u32,
    #[serde(default)]
    pub confidence: f64,
    #[serde(rename = "detail", alias = "message", default = "no_detail")]
    pub message: String,
}

/// Outcome of assessing one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Assessment {
    /// Too few samples to say anything; not the same as healthy.
    InsufficientData { have: usize, needed: usize },
    Healthy,
    Anomalous(AnomalyEvent),
}

impl Assessment {
    pub fn into_event(self) -> Option<AnomalyEvent> {
        match self {
            Assessment::Anomalous(event) => Some(event),
            _ => None,
        }
    }
}

/// Assess the most recent `config.window_size` samples of `service`.
///
/// `samples` must be ordered oldest to newest. Samples belonging to other
/// services are ignored.
pub fn assess_window(service: &str, samples: &[Sample], config: &DetectorConfig) -> Assessment {
    let own: Vec<&Sample> = samples.iter().filter(|s| s.service == service).collect();
    let start = own.len().saturating_sub(config.window_size);
    let window = &own[start..];

    let stats = match WindowStats::from_samples(window) {
        Ok(stats) => stats,
        Err(DetectError::InsufficientData { needed, have }) => {
            return Assessment::InsufficientData { have, needed };
        }
    };

    match rules::classify(&stats, config) {
        Some(rule) => Assessment::Anomalous(rule.event(service, &stats)),
        None => Assessment::Healthy,
    }
}

/// [`assess_window`] collapsed to "anomaly or not".
pub fn evaluate_window(
    service: &str,
    samples: &[Sample],
    config: &DetectorConfig,
) -> Option<AnomalyEvent> {
    assess_window(service, samples, config).into_event()
}
