use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use super::{Acknowledgment, DispatchError, Dispatcher};
use crate::detect::AnomalyEvent;
use crate::heal::RemediationEngine;

/// In-process transport backed by a bounded channel.
///
/// Sending never waits: a full queue is a failed delivery, same as an
/// unreachable remote healer.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<AnomalyEvent>,
}

impl ChannelDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnomalyEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn send(&self, event: &AnomalyEvent) -> Result<Acknowledgment, DispatchError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;
        Ok(Acknowledgment::queued())
    }
}

/// Feed every received event to the engine, one at a time.
/// Returns once all senders are dropped.
pub async fn run_receiver(mut rx: mpsc::Receiver<AnomalyEvent>, engine: Arc<RemediationEngine>) {
    info!("Healer receiver started");
    while let Some(event) = rx.recv().await {
        engine.handle(&event).await;
    }
    info!("Healer receiver stopped, channel closed");
}
