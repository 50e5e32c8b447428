use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// Reachability check used by the failover branch.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// `true` iff `url` answered healthy within the timeout. Never errors.
    async fn probe(&self, url: &str) -> bool;
}

/// HTTP GET probe: healthy iff the status is exactly 200.
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build health probe HTTP client")?,
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let healthy = resp.status() == StatusCode::OK;
                tracing::debug!(%url, status = resp.status().as_u16(), healthy, "Health probe finished");
                healthy
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};
    use std::time::Instant;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_200_is_healthy() {
        let base = spawn(Router::new().route("/", get(|| async { "ok" }))).await;
        let probe = HttpHealthProbe::new(Duration::from_secs(5)).unwrap();
        assert!(probe.probe(&base).await);
    }

    #[tokio::test]
    async fn test_other_status_is_unhealthy() {
        let base = spawn(
            Router::new()
                .route("/down", get(|| async { AxumStatus::SERVICE_UNAVAILABLE }))
                .route("/moved", get(|| async { AxumStatus::NO_CONTENT })),
        )
        .await;
        let probe = HttpHealthProbe::new(Duration::from_secs(5)).unwrap();
        assert!(!probe.probe(&format!("{base}/down")).await);
        assert!(!probe.probe(&format!("{base}/moved")).await);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpHealthProbe::new(Duration::from_secs(5)).unwrap();
        assert!(!probe.probe(&format!("http://{addr}/")).await);
    }

    #[tokio::test]
    async fn test_timeout_is_unhealthy_and_bounded() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = HttpHealthProbe::new(Duration::from_millis(300)).unwrap();
        let start = Instant::now();
        assert!(!probe.probe(&format!("http://{addr}/")).await);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_malformed_url_is_unhealthy() {
        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        assert!(!probe.probe("not a url").await);
    }
}
