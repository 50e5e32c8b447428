//! Toy target service for exercising the loop end to end.
//!
//! `/metrics` reports a slowly leaking process; `/fault` injects failures so
//! each detector rule can be triggered on demand.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Failure currently injected into the demo target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Fault {
    #[default]
    None,
    /// Every request fails with 500.
    Errors,
    /// Every request is delayed.
    Latency { delay_ms: u64 },
}

struct DemoState {
    started: Instant,
    leak_mb: f64,
    fault: Fault,
}

type Shared = Arc<Mutex<DemoState>>;

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, DemoState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn router() -> Router {
    let state: Shared = Arc::new(Mutex::new(DemoState {
        started: Instant::now(),
        leak_mb: 0.0,
        fault: Fault::None,
    }));

    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/fault", get(current_fault).post(set_fault))
        .with_state(state)
}

/// Run the demo target until the process exits.
pub async fn serve(bind: &str) -> Result<()> {
    let addr: std::net::SocketAddr = bind.parse()?;
    tracing::info!(%addr, "Demo target listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await?;
    Ok(())
}

async fn metrics(State(state): State<Shared>) -> Response {
    let (body, fault) = {
        let mut rng = rand::thread_rng();
        let mut s = lock(&state);
        s.leak_mb += rng.gen_range(0.0..5.0);
        let resp_ms = rng.gen_range(50.0..150.0) + s.leak_mb * 0.3;
        let err_rate = if rng.gen::<f64>() > 0.02 { 0.0 } else { 1.0 };
        let body = json!({
            "uptime": s.started.elapsed().as_secs(),
            "resp_ms": resp_ms,
            "mem_mb": 200.0 + s.leak_mb,
            "err_rate": err_rate,
        });
        (body, s.fault.clone())
    };

    match fault {
        Fault::None => Json(body).into_response(),
        Fault::Errors => (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response(),
        Fault::Latency { delay_ms } => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Json(body).into_response()
        }
    }
}

async fn health(State(state): State<Shared>) -> StatusCode {
    match lock(&state).fault {
        Fault::Errors => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

async fn current_fault(State(state): State<Shared>) -> Json<Fault> {
    Json(lock(&state).fault.clone())
}

async fn set_fault(State(state): State<Shared>, Json(fault): Json<Fault>) -> Json<Fault> {
    tracing::info!(?fault, "Demo fault injected");
    lock(&state).fault = fault.clone();
    Json(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for `oneshot`

    async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_metrics_reports_leak() {
        let app = router();
        let (status, first) = call(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        let mem = first["mem_mb"].as_f64().unwrap();
        assert!((200.0..205.0).contains(&mem));

        let (_, second) = call(&app, "GET", "/metrics", None).await;
        assert!(second["mem_mb"].as_f64().unwrap() >= mem);
    }

    #[tokio::test]
    async fn test_error_fault_fails_requests() {
        let app = router();
        let (status, fault) =
            call(&app, "POST", "/fault", Some(r#"{"mode":"errors"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fault["mode"], "errors");

        let (status, _) = call(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        call(&app, "POST", "/fault", Some(r#"{"mode":"none"}"#)).await;
        let (status, _) = call(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_latency_fault_delays_requests() {
        let app = router();
        call(&app, "POST", "/fault", Some(r#"{"mode":"latency","delay_ms":200}"#)).await;

        let (_, fault) = call(&app, "GET", "/fault", None).await;
        assert_eq!(fault["delay_ms"], 200);

        let start = Instant::now();
        let (status, _) = call(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
