//! Target sampling -- the raw metric stream the detector consumes.

pub mod engine;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Response time recorded when the target could not be reached at all.
pub const PENALTY_RESPONSE_MS: f64 = 9999.0;

/// One observation of a service. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch seconds.
    pub timestamp: i64,
    pub service: String,
    pub response_time_ms: f64,
    pub memory_mb: f64,
    /// Fraction of failed requests in `[0, 1]`.
    pub error_rate: f64,
}

impl Sample {
    pub fn new(service: &str, response_time_ms: f64, memory_mb: f64, error_rate: f64) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            service: service.to_string(),
            response_time_ms,
            memory_mb,
            error_rate,
        }
    }

    /// Maximal-penalty sample for a transport failure (timeout, DNS, refused).
    pub fn penalty(service: &str) -> Self {
        Self::new(service, PENALTY_RESPONSE_MS, 0.0, 1.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.service.is_empty() {
            return Err("service must not be empty".to_string());
        }
        if !self.response_time_ms.is_finite() || self.response_time_ms < 0.0 {
            return Err(format!(
                "response_time_ms must be a non-negative number, got {}",
                self.response_time_ms
            ));
        }
        if !self.memory_mb.is_finite() || self.memory_mb < 0.0 {
            return Err(format!(
                "memory_mb must be a non-negative number, got {}",
                self.memory_mb
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(format!(
                "error_rate must be within [0, 1], got {}",
                self.error_rate
            ));
        }
        Ok(())
    }
}

/// Polls a target URL and turns each request into a [`Sample`].
pub struct HttpSampler {
    client: Client,
    service: String,
    target: String,
}

impl HttpSampler {
    pub fn new(service: &str, target: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("selfheal/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build sampler HTTP client")?;

        Ok(Self {
            client,
            service: service.to_string(),
            target: target.to_string(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Issue one request. Never fails: transport errors become a penalty sample.
    pub async fn sample_once(&self) -> Sample {
        let start = Instant::now();
        match self.client.get(&self.target).send().await {
            Ok(resp) => {
                let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                let status = resp.status();
                let error_rate = if status == StatusCode::OK { 0.0 } else { 1.0 };

                // Targets that report their own footprint expose it as `mem_mb`.
                let memory_mb = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| body.get("mem_mb").and_then(|v| v.as_f64()))
                    .filter(|mb| mb.is_finite() && *mb >= 0.0)
                    .unwrap_or(0.0);

                tracing::info!(
                    service = %self.service,
                    status = status.as_u16(),
                    response_ms = %format!("{response_time_ms:.2}"),
                    error_rate,
                    "Sampled target"
                );
                Sample::new(&self.service, response_time_ms, memory_mb, error_rate)
            }
            Err(e) => {
                tracing::warn!(service = %self.service, error = %e, "Network error while sampling");
                Sample::penalty(&self.service)
            }
        }
    }
}
