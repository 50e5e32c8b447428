use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    Action, ActionError, ActiveUpstream, HealthCheck, Incident, MonitorRestart, Remedy,
};
use crate::detect::AnomalyEvent;
use crate::storage::MetricStore;

/// Executes one corrective action per event and records it.
///
/// `handle` never fails: action errors become an incident with
/// `success = false`.
pub struct RemediationEngine {
    store: MetricStore,
    upstream: Arc<ActiveUpstream>,
    probe: Arc<dyn HealthCheck>,
    recovery: Arc<dyn MonitorRestart>,
}

impl RemediationEngine {
    pub fn new(
        store: MetricStore,
        upstream: Arc<ActiveUpstream>,
        probe: Arc<dyn HealthCheck>,
        recovery: Arc<dyn MonitorRestart>,
    ) -> Self {
        Self {
            store,
            upstream,
            probe,
            recovery,
        }
    }

    pub fn upstream(&self) -> &Arc<ActiveUpstream> {
        &self.upstream
    }

    /// Handle one delivered event. Always yields exactly one incident.
    pub async fn handle(&self, event: &AnomalyEvent) -> Incident {
        info!(
            service = %event.service,
            kind = %event.kind,
            eta_min = event.eta_minutes,
            detail = %event.message,
            "Received prediction"
        );

        let (action, success) = match self.execute(Remedy::for_kind(&event.kind)).await {
            Ok(action) => (action.to_string(), true),
            Err(e) => {
                warn!(service = %event.service, kind = %event.kind, error = %e, "Remediation action failed");
                (format!("error during healing: {e}"), false)
            }
        };

        let incident = Incident {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().timestamp(),
            service: event.service.clone(),
            kind: event.kind.to_string(),
            detail: event.message.clone(),
            action,
            success,
        };

        let store = self.store.clone();
        let record = incident.clone();
        match tokio::task::spawn_blocking(move || store.append_incident(&record)).await {
            Ok(Ok(())) => info!(
                service = %incident.service,
                kind = %incident.kind,
                action = %incident.action,
                success = incident.success,
                "Logged incident"
            ),
            Ok(Err(e)) => error!(incident = %incident.id, "Failed to store incident: {}", e),
            Err(e) => error!(incident = %incident.id, "Incident writer failed: {}", e),
        }

        incident
    }

    async fn execute(&self, remedy: Remedy) -> Result<Action, ActionError> {
        match remedy {
            Remedy::Failover => {
                let primary = self.upstream.primary();
                info!(%primary, "Checking primary upstream health");
                if self.probe.probe(primary).await {
                    info!(%primary, "Primary upstream healthy, no switch needed");
                    Ok(Action::CheckedHealthOk)
                } else {
                    let backup = self
                        .upstream
                        .switch_to_backup()
                        .ok_or(ActionError::NoBackupConfigured)?;
                    warn!(%primary, %backup, "Primary upstream down, switched to backup");
                    Ok(Action::SwitchedToBackup)
                }
            }
            Remedy::SoftRecovery => {
                info!("Attempting soft recovery: restarting monitor");
                self.recovery.restart()?;
                Ok(Action::RestartedMonitor)
            }
            Remedy::LogOnly => Ok(Action::LoggedPredictionOnly),
        }
    }
}
