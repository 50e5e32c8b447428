//! The active upstream pointer.
//!
//! Written only by the failover branch of the remediation engine; read by
//! anything that routes traffic. There is no automatic fail-back.

use std::sync::RwLock;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamSnapshot {
    pub primary: String,
    pub backup: Option<String>,
    pub active: String,
    pub on_backup: bool,
}

#[derive(Debug)]
pub struct ActiveUpstream {
    primary: String,
    backup: Option<String>,
    active: RwLock<String>,
}

impl ActiveUpstream {
    pub fn new(primary: &str, backup: Option<&str>) -> Self {
        Self {
            primary: primary.to_string(),
            backup: backup.map(str::to_string),
            active: RwLock::new(primary.to_string()),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn backup(&self) -> Option<&str> {
        self.backup.as_deref()
    }

    /// Where traffic should currently go.
    pub fn active(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_on_backup(&self) -> bool {
        let active = self.active();
        active != self.primary && self.backup() == Some(active.as_str())
    }

    /// Point traffic at the backup. Returns the backup URL, or `None` when
    /// no backup is configured.
    pub fn switch_to_backup(&self) -> Option<&str> {
        let backup = self.backup()?;
        let mut active = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = backup.to_string();
        Some(backup)
    }

    pub fn snapshot(&self) -> UpstreamSnapshot {
        UpstreamSnapshot {
            primary: self.primary.clone(),
            backup: self.backup().map(str::to_string),
            active: self.active(),
            on_backup: self.is_on_backup(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_on_primary() {
        let up = ActiveUpstream::new("https://primary", Some("https://backup"));
        assert_eq!(up.active(), "https://primary");
        assert!(!up.is_on_backup());
    }

    #[test]
    fn test_switch_is_one_way() {
        let up = ActiveUpstream::new("https://primary", Some("https://backup"));
        assert_eq!(up.switch_to_backup(), Some("https://backup"));
        assert_eq!(up.active(), "https://backup");
        assert!(up.is_on_backup());

        // Switching again keeps us on the backup.
        up.switch_to_backup();
        assert_eq!(up.active(), "https://backup");
    }

    #[test]
    fn test_switch_without_backup() {
        let up = ActiveUpstream::new("https://primary", None);
        assert_eq!(up.switch_to_backup(), None);
        assert_eq!(up.active(), "https://primary");
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let up = Arc::new(ActiveUpstream::new("https://primary", Some("https://backup")));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let up = up.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let v = up.active();
                        assert!(v == "https://primary" || v == "https://backup");
                    }
                })
            })
            .collect();
        up.switch_to_backup();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(up.snapshot().active, "https://backup");
    }
}
