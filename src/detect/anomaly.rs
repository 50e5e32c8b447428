use crate::detect::{DetectError, MIN_SAMPLES};
use crate::monitor::Sample;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self
            .values
            .iter()
            .map(|&x| (x - mean).powi(2))
            .sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Least-squares slope of the values against their index (0, 1, 2, ...).
    /// Units are "value per step".
    pub fn slope(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let x_mean = (n - 1) as f64 / 2.0;
        let y_mean = self.mean();

        let (mut num, mut den) = (0.0, 0.0);
        for (i, &y) in self.values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - y_mean);
            den += dx * dx;
        }
        num / den
    }
}

/// Summary statistics of one detection window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub samples: usize,
    pub mean_error_rate: f64,
    pub mean_response_ms: f64,
    pub stddev_response_ms: f64,
    pub slope_ms_per_step: f64,
}

impl WindowStats {
    /// Compute statistics over `window`, ordered oldest to newest.
    pub fn from_samples(window: &[&Sample]) -> Result<Self, DetectError> {
        if window.len() < MIN_SAMPLES {
            return Err(DetectError::InsufficientData {
                needed: MIN_SAMPLES,
                have: window.len(),
            });
        }

        let response = TimeSeries::new(window.iter().map(|s| s.response_time_ms).collect());
        let errors = TimeSeries::new(window.iter().map(|s| s.error_rate).collect());

        Ok(Self {
            samples: response.len(),
            mean_error_rate: errors.mean(),
            mean_response_ms: response.mean(),
            stddev_response_ms: response.std_dev(),
            slope_ms_per_step: response.slope(),
        })
    }
}
