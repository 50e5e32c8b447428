//! Event delivery from the detector to the remediation engine.
//!
//! Delivery is at-most-once: one attempt, no retry. The sender logs the
//! outcome; an event that never arrives produces no incident.

pub mod channel;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::AnomalyEvent;

pub use self::channel::{run_receiver, ChannelDispatcher};
pub use self::http::HttpDispatcher;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("healer unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("healer rejected event with status {status}")]
    Rejected { status: u16 },

    #[error("event queue is full")]
    QueueFull,

    #[error("healer channel closed")]
    Closed,
}

/// What the receiving side reported back, if anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub status: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl Acknowledgment {
    /// Handed to an in-process queue; the outcome is not known yet.
    pub fn queued() -> Self {
        Self {
            status: "queued".to_string(),
            action: None,
            success: None,
        }
    }

    /// Accepted by a receiver that did not describe the outcome.
    pub fn delivered() -> Self {
        Self {
            status: "delivered".to_string(),
            action: None,
            success: None,
        }
    }

    pub fn action_taken(action: &str, success: bool) -> Self {
        Self {
            status: "action_taken".to_string(),
            action: Some(action.to_string()),
            success: Some(success),
        }
    }
}

/// One-way transport for anomaly events.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Make exactly one delivery attempt.
    async fn send(&self, event: &AnomalyEvent) -> Result<Acknowledgment, DispatchError>;
}
