//! Remediation -- maps an anomaly event to one corrective action and records
//! the outcome as an incident.

pub mod engine;
pub mod probe;
pub mod recovery;
pub mod upstream;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::detect::AnomalyKind;

pub use self::engine::RemediationEngine;
pub use self::probe::{HealthCheck, HttpHealthProbe};
pub use self::recovery::{MonitorRestart, ProcessRelauncher, TaskSupervisor};
pub use self::upstream::ActiveUpstream;

/// Failure while carrying out a remediation action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("primary upstream is unhealthy and no backup is configured")]
    NoBackupConfigured,

    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("restart command is empty")]
    EmptyCommand,

    #[error("monitor supervisor unavailable: {0}")]
    SupervisorUnavailable(String),
}

/// The branch of the decision table an event falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Probe the primary upstream; switch to the backup if it is down.
    Failover,
    /// Restart the metric collector.
    SoftRecovery,
    /// Record the prediction, take no action.
    LogOnly,
}

impl Remedy {
    /// Category match on the kind name, so kinds from newer detectors still
    /// land in the right branch.
    pub fn for_kind(kind: &AnomalyKind) -> Self {
        let name = kind.as_str();
        if name.contains("failure") || name.contains("spike") {
            Remedy::Failover
        } else if name.contains("latency") || name.contains("slowdown") {
            Remedy::SoftRecovery
        } else {
            Remedy::LogOnly
        }
    }
}

/// A completed remediation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SwitchedToBackup,
    CheckedHealthOk,
    RestartedMonitor,
    LoggedPredictionOnly,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::SwitchedToBackup => "switched to backup",
            Action::CheckedHealthOk => "checked health (OK)",
            Action::RestartedMonitor => "restarted monitor",
            Action::LoggedPredictionOnly => "logged prediction only",
        })
    }
}

/// Audit record of one remediation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    /// Epoch seconds.
    pub timestamp: i64,
    pub service: String,
    pub kind: String,
    /// The event's message.
    pub detail: String,
    pub action: String,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remedy_by_kind() {
        assert_eq!(Remedy::for_kind(&AnomalyKind::ApiFailureSpike), Remedy::Failover);
        assert_eq!(
            Remedy::for_kind(&AnomalyKind::ApiLatencyIncrease),
            Remedy::SoftRecovery
        );
        assert_eq!(
            Remedy::for_kind(&AnomalyKind::GradualSlowdown),
            Remedy::SoftRecovery
        );
        assert_eq!(Remedy::for_kind(&AnomalyKind::from("memory_leak")), Remedy::LogOnly);
    }

    #[test]
    fn test_remedy_matches_by_category() {
        assert_eq!(Remedy::for_kind(&AnomalyKind::from("db_failure")), Remedy::Failover);
        assert_eq!(Remedy::for_kind(&AnomalyKind::from("cpu_spike")), Remedy::Failover);
        assert_eq!(
            Remedy::for_kind(&AnomalyKind::from("disk_latency_high")),
            Remedy::SoftRecovery
        );
    }

    #[test]
    fn test_action_text() {
        assert_eq!(Action::SwitchedToBackup.to_string(), "switched to backup");
        assert_eq!(Action::CheckedHealthOk.to_string(), "checked health (OK)");
        assert_eq!(Action::RestartedMonitor.to_string(), "restarted monitor");
        assert_eq!(
            Action::LoggedPredictionOnly.to_string(),
            "logged prediction only"
        );
    }
}
