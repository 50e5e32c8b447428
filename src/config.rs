//! TOML configuration for selfheal.
//!
//! Every section carries compiled-in defaults, so a partial (or empty) file is
//! valid. The config path can be overridden with the `SELFHEAL_CONFIG`
//! environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SELFHEAL_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG: &str = "selfheal.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration shared by every selfheal process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub healer: HealerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the configuration, in order:
    /// 1. An explicit path (the `--config` flag).
    /// 2. The path in `SELFHEAL_CONFIG`.
    /// 3. `./selfheal.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// An explicit path that fails to load is an error; the implicit
    /// locations fall through and are reported in [`Resolved::skipped`].
    /// Nothing is logged here since this runs before tracing is installed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Resolved> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::resolve_from(explicit, env_path.as_deref(), Path::new(LOCAL_CONFIG))
    }

    fn resolve_from(
        explicit: Option<&Path>,
        env_path: Option<&Path>,
        local: &Path,
    ) -> Result<Resolved> {
        if let Some(path) = explicit {
            return Ok(Resolved {
                config: Self::load(path)?,
                source: Some(path.to_path_buf()),
                skipped: Vec::new(),
            });
        }

        let mut skipped = Vec::new();
        let candidates = env_path
            .into_iter()
            .map(|p| (p, true))
            .chain(std::iter::once((local, local.exists())));

        for (path, present) in candidates {
            if !present {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    return Ok(Resolved {
                        config,
                        source: Some(path.to_path_buf()),
                        skipped,
                    })
                }
                Err(error) => skipped.push(SkippedConfig {
                    path: path.to_path_buf(),
                    error: format!("{error:#}"),
                }),
            }
        }

        Ok(Resolved {
            config: Self::default(),
            source: None,
            skipped,
        })
    }

    /// Reject values the control loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            bail!("service.name must not be empty");
        }
        if self.monitor.poll_interval_secs == 0 {
            bail!("monitor.poll_interval_secs must be greater than zero");
        }
        if self.detector.check_interval_secs == 0 {
            bail!("detector.check_interval_secs must be greater than zero");
        }
        if self.detector.window_size < crate::detect::MIN_SAMPLES {
            bail!(
                "detector.window_size must be at least {} (got {})",
                crate::detect::MIN_SAMPLES,
                self.detector.window_size
            );
        }
        let thresholds = [
            ("error_rate_threshold", self.detector.error_rate_threshold),
            ("latency_mean_threshold_ms", self.detector.latency_mean_threshold_ms),
            ("latency_stddev_threshold_ms", self.detector.latency_stddev_threshold_ms),
            ("slope_threshold_ms", self.detector.slope_threshold_ms),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                bail!("detector.{name} must be a positive number (got {value})");
            }
        }
        if self.healer.probe_timeout_secs == 0 {
            bail!("healer.probe_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// A config file that was found but could not be used.
#[derive(Debug, Clone)]
pub struct SkippedConfig {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`Config::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub config: Config,
    /// File the config came from; `None` means compiled-in defaults.
    pub source: Option<PathBuf>,
    pub skipped: Vec<SkippedConfig>,
}

impl Resolved {
    /// Report how the config was chosen. Call once tracing is installed.
    pub fn log(&self) {
        for skip in &self.skipped {
            warn!(
                path = %skip.path.display(),
                error = %skip.error,
                "config file could not be loaded, trying fallback"
            );
        }
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded configuration"),
            None if self.skipped.is_empty() => {
                debug!("no config file found, using compiled-in defaults")
            }
            None => warn!("no usable config file, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The service being watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Identifier stored with every sample and incident.
    pub name: String,
    /// URL polled by the sampler.
    pub target_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "real-service".to_string(),
            target_url: "https://api.github.com".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Window size and classification thresholds for the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Number of most recent samples in one evaluation window.
    pub window_size: usize,
    pub check_interval_secs: u64,
    /// Mean error rate above which the window is a failure spike.
    pub error_rate_threshold: f64,
    /// Mean response time (ms) above which latency is considered elevated.
    pub latency_mean_threshold_ms: f64,
    /// Response time standard deviation (ms) above which latency is unstable.
    pub latency_stddev_threshold_ms: f64,
    /// Fitted response time increase per sample (ms) that signals a slowdown.
    pub slope_threshold_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 15,
            check_interval_secs: 30,
            error_rate_threshold: 0.30,
            latency_mean_threshold_ms: 2000.0,
            latency_stddev_threshold_ms: 1000.0,
            slope_threshold_ms: 20.0,
        }
    }
}

impl DetectorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Healer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerConfig {
    /// Listen address for the healer / dashboard API.
    pub bind: String,
    /// Upstream dependency probed on failure-class events.
    pub primary_upstream: String,
    /// Upstream switched to when the primary is unhealthy.
    pub backup_upstream: Option<String>,
    pub probe_timeout_secs: u64,
    /// argv used by the standalone healer to relaunch the monitor process.
    pub restart_command: Vec<String>,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9002".to_string(),
            primary_upstream: "https://api.github.com".to_string(),
            backup_upstream: Some("https://api.gitlab.com".to_string()),
            probe_timeout_secs: 5,
            restart_command: vec!["selfheal".to_string(), "monitor".to_string()],
        }
    }
}

impl HealerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Healer endpoint the standalone predictor posts events to.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9002/api/v1/predict_event".to_string(),
            timeout_secs: 5,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Storage / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/selfheal.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
