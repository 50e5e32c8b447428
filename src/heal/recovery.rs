//! Soft recovery: restarting the metric collector without blocking the healer.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::process::Child;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ActionError;

/// Something that can restart the monitor. Must return promptly; the restart
/// itself is not awaited.
pub trait MonitorRestart: Send + Sync {
    fn restart(&self) -> Result<(), ActionError>;
}

/// Relaunches the monitor as a separate process (standalone healer mode).
///
/// At most one child is owned at a time: a restart kills the previous
/// monitor before spawning the next one.
pub struct ProcessRelauncher {
    argv: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessRelauncher {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            child: Mutex::new(None),
        }
    }

    /// Process id of the monitor currently owned, if it is still alive.
    #[cfg(test)]
    fn running_pid(&self) -> Option<u32> {
        let mut slot = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let child = slot.as_mut()?;
        match child.try_wait() {
            Ok(None) => child.id(),
            _ => None,
        }
    }
}

impl MonitorRestart for ProcessRelauncher {
    fn restart(&self) -> Result<(), ActionError> {
        let (program, args) = self.argv.split_first().ok_or(ActionError::EmptyCommand)?;

        // tokio::process needs a runtime for child reaping.
        let runtime =
            Handle::try_current().map_err(|e| ActionError::SupervisorUnavailable(e.to_string()))?;

        let mut slot = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut old) = slot.take() {
            let pid = old.id();
            if let Err(e) = old.start_kill() {
                debug!(?pid, error = %e, "Previous monitor process already exited");
            }
            runtime.spawn(async move {
                let _ = old.wait().await;
            });
            info!(?pid, "Stopped previous monitor process");
        }

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ActionError::Launch {
                command: self.argv.join(" "),
                source,
            })?;

        info!(command = %self.argv.join(" "), pid = ?child.id(), "Launched monitor process");
        *slot = Some(child);
        Ok(())
    }
}

type TaskFactory = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Owns the handle of an in-process task and can replace it with a fresh one.
pub struct TaskSupervisor {
    name: String,
    factory: TaskFactory,
    handle: Mutex<Option<JoinHandle<()>>>,
    launches: AtomicU64,
}

impl TaskSupervisor {
    pub fn new<F, Fut>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            factory: Box::new(move || Box::pin(factory())),
            handle: Mutex::new(None),
            launches: AtomicU64::new(0),
        }
    }

    /// Abort any running instance and spawn a new one.
    pub fn launch(&self) -> Result<(), ActionError> {
        let runtime =
            Handle::try_current().map_err(|e| ActionError::SupervisorUnavailable(e.to_string()))?;

        let mut slot = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(runtime.spawn((self.factory)()));

        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        info!(task = %self.name, launches = n, "Supervised task launched");
        Ok(())
    }

    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl MonitorRestart for TaskSupervisor {
    fn restart(&self) -> Result<(), ActionError> {
        self.launch()
    }
}

impl Drop for TaskSupervisor {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_restart_replaces_running_task() {
        let started = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicUsize::new(0));

        let (s, a) = (started.clone(), alive.clone());
        let supervisor = TaskSupervisor::new("monitor", move || {
            let (s, a) = (s.clone(), a.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                a.fetch_add(1, Ordering::SeqCst);
                // Decrements when aborted.
                struct Guard(Arc<AtomicUsize>);
                impl Drop for Guard {
                    fn drop(&mut self) {
                        self.0.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                let _guard = Guard(a);
                std::future::pending::<()>().await;
            }
        });

        supervisor.launch().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor.restart().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(supervisor.launches(), 2);
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(alive.load(Ordering::SeqCst), 1);
        assert!(supervisor.is_running());
    }

    #[test]
    fn test_restart_without_runtime_fails() {
        let supervisor = TaskSupervisor::new("monitor", || async {});
        let err = supervisor.restart().unwrap_err();
        assert!(matches!(err, ActionError::SupervisorUnavailable(_)));
        assert_eq!(supervisor.launches(), 0);
    }

    #[tokio::test]
    async fn test_relaunch_missing_binary_fails() {
        let relauncher = ProcessRelauncher::new(vec!["/nonexistent/selfheal-monitor".to_string()]);
        let err = relauncher.restart().unwrap_err();
        assert!(matches!(err, ActionError::Launch { .. }));
        assert!(err.to_string().contains("/nonexistent/selfheal-monitor"));
    }

    #[tokio::test]
    async fn test_relaunch_empty_command_fails() {
        let relauncher = ProcessRelauncher::new(Vec::new());
        assert!(matches!(relauncher.restart(), Err(ActionError::EmptyCommand)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_relaunch_keeps_a_single_child() {
        let relauncher =
            ProcessRelauncher::new(vec!["sleep".to_string(), "30".to_string()]);

        relauncher.restart().unwrap();
        let first = relauncher.running_pid().unwrap();
        relauncher.restart().unwrap();
        let second = relauncher.running_pid().unwrap();
        assert_ne!(first, second);

        // The replaced child is killed and reaped in the background.
        let gone = std::path::PathBuf::from(format!("/proc/{first}"));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while gone.exists() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!gone.exists(), "previous monitor {first} still alive");
        assert_eq!(relauncher.running_pid(), Some(second));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_relaunch_still_stops_previous_child() {
        let relauncher =
            ProcessRelauncher::new(vec!["sleep".to_string(), "30".to_string()]);
        relauncher.restart().unwrap();
        assert!(relauncher.running_pid().is_some());

        let broken = ProcessRelauncher {
            argv: vec!["/nonexistent/selfheal-monitor".to_string()],
            child: Mutex::new(relauncher.child.lock().unwrap().take()),
        };
        assert!(matches!(broken.restart(), Err(ActionError::Launch { .. })));
        assert!(broken.running_pid().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relaunch_does_not_wait_for_child() {
        let relauncher =
            ProcessRelauncher::new(vec!["sleep".to_string(), "5".to_string()]);
        let start = std::time::Instant::now();
        relauncher.restart().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
