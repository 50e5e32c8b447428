use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;

use super::{Acknowledgment, DispatchError, Dispatcher};
use crate::detect::AnomalyEvent;

/// Posts events as JSON to a remote healer endpoint.
pub struct HttpDispatcher {
    client: Client,
    endpoint: String,
}

impl HttpDispatcher {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build dispatch HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, event: &AnomalyEvent) -> Result<Acknowledgment, DispatchError> {
        let resp = self.client.post(&self.endpoint).json(event).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(resp
            .json::<Acknowledgment>()
            .await
            .unwrap_or_else(|_| Acknowledgment::delivered()))
    }
}
