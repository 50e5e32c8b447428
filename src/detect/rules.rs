//! Ordered classification rules.
//!
//! Conditions overlap (a failing service is usually slow too), so the order of
//! [`RULES`] decides the outcome: failure, then latency, then trend.

use crate::config::DetectorConfig;
use crate::detect::anomaly::WindowStats;
use crate::detect::{AnomalyEvent, AnomalyKind};

/// One entry in the rule table.
pub struct Rule {
    pub kind: AnomalyKind,
    pub eta_minutes: u32,
    pub confidence: f64,
    matches: fn(&WindowStats, &DetectorConfig) -> bool,
    describe: fn(&WindowStats) -> String,
}

impl Rule {
    pub fn matches(&self, stats: &WindowStats, config: &DetectorConfig) -> bool {
        (self.matches)(stats, config)
    }

    pub fn event(&self, service: &str, stats: &WindowStats) -> AnomalyEvent {
        AnomalyEvent {
            service: service.to_string(),
            kind: self.kind.clone(),
            eta_minutes: self.eta_minutes,
            confidence: self.confidence,
            message: (self.describe)(stats),
        }
    }
}

pub static RULES: [Rule; 3] = [
    Rule {
        kind: AnomalyKind::ApiFailureSpike,
        eta_minutes: 1,
        confidence: 0.9,
        matches: |s, c| s.mean_error_rate > c.error_rate_threshold,
        describe: |s| format!("High error rate detected: {:.1}%", s.mean_error_rate * 100.0),
    },
    Rule {
        kind: AnomalyKind::ApiLatencyIncrease,
        eta_minutes: 2,
        confidence: 0.8,
        matches: |s, c| {
            s.mean_response_ms > c.latency_mean_threshold_ms
                || s.stddev_response_ms > c.latency_stddev_threshold_ms
        },
        describe: |s| {
            format!(
                "Response time unstable (avg={:.1}ms, std={:.1}ms)",
                s.mean_response_ms, s.stddev_response_ms
            )
        },
    },
    Rule {
        kind: AnomalyKind::GradualSlowdown,
        eta_minutes: 5,
        confidence: 0.7,
        matches: |s, c| s.slope_ms_per_step > c.slope_threshold_ms,
        describe: |s| {
            format!(
                "API response time trending upward ({:.1}ms per step)",
                s.slope_ms_per_step
            )
        },
    },
];

/// First rule that matches, if any.
pub fn classify(stats: &WindowStats, config: &DetectorConfig) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.matches(stats, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(error: f64, mean: f64, std: f64, slope: f64) -> WindowStats {
        WindowStats {
            samples: 15,
            mean_error_rate: error,
            mean_response_ms: mean,
            stddev_response_ms: std,
            slope_ms_per_step: slope,
        }
    }

    #[test]
    fn test_rule_order_is_failure_latency_trend() {
        let kinds: Vec<_> = RULES.iter().map(|r| r.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::ApiFailureSpike,
                AnomalyKind::ApiLatencyIncrease,
                AnomalyKind::GradualSlowdown,
            ]
        );
    }

    #[test]
    fn test_overlapping_conditions_resolve_by_order() {
        let cfg = DetectorConfig::default();

        let all = stats(0.9, 5000.0, 2000.0, 100.0);
        assert_eq!(classify(&all, &cfg).unwrap().kind, AnomalyKind::ApiFailureSpike);

        let latency_and_trend = stats(0.0, 5000.0, 0.0, 100.0);
        assert_eq!(
            classify(&latency_and_trend, &cfg).unwrap().kind,
            AnomalyKind::ApiLatencyIncrease
        );

        let trend_only = stats(0.0, 300.0, 120.0, 21.0);
        assert_eq!(
            classify(&trend_only, &cfg).unwrap().kind,
            AnomalyKind::GradualSlowdown
        );
    }

    #[test]
    fn test_thresholds_are_strict() {
        let cfg = DetectorConfig::default();
        assert!(classify(&stats(0.25, 2000.0, 1000.0, 20.0), &cfg).is_none());
        assert!(classify(&stats(0.0, 150.0, 0.0, 0.0), &cfg).is_none());
    }

    #[test]
    fn test_event_carries_rule_constants() {
        let rule = &RULES[2];
        let event = rule.event("api", &stats(0.0, 300.0, 100.0, 28.57));
        assert_eq!(event.eta_minutes, 5);
        assert_eq!(event.confidence, 0.7);
        assert_eq!(event.message, "API response time trending upward (28.6ms per step)");
    }
}
