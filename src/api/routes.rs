//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::state::AppState;
use crate::detect::AnomalyEvent;
use crate::dispatch::Acknowledgment;
use crate::storage::StoreError;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/predict_event", post(predict_event))
        .route("/services", get(list_services))
        .route("/services/{service}/samples", get(service_samples))
        .route("/services/{service}/assessment", get(service_assessment))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{id}", get(get_incident))
        .route("/upstream", get(upstream))
}

/// Storage failures surface as 503 so the dashboard can tell "empty" from "down".
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("API storage error: {}", self.0);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    service: Option<String>,
}

impl ListParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn predict_event(
    State(state): State<AppState>,
    Json(event): Json<AnomalyEvent>,
) -> Json<Acknowledgment> {
    let incident = state.engine.handle(&event).await;
    Json(Acknowledgment::action_taken(&incident.action, incident.success))
}

async fn list_services(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let services = tokio::task::spawn_blocking(move || store.services())
        .await
        .map_err(StoreError::from)??;
    Ok(Json(json!({ "data": services, "meta": { "total": services.len() } })))
}

async fn service_samples(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let limit = params.limit();
    let samples = tokio::task::spawn_blocking(move || store.fetch_recent(&service, limit))
        .await
        .map_err(StoreError::from)??;
    Ok(Json(json!({ "data": samples, "meta": { "total": samples.len() } })))
}

async fn service_assessment(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let assessment = state.detector.assess(&service).await?;
    Ok(Json(json!({
        "data": assessment,
        "meta": {
            "service": service,
            "window": state.detector.config().window_size,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    })))
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let limit = params.limit();
    let incidents = tokio::task::spawn_blocking(move || match params.service.as_deref() {
        Some(service) => store.fetch_incidents_for(service, limit),
        None => store.fetch_recent_incidents(limit),
    })
    .await
    .map_err(StoreError::from)??;
    Ok(Json(json!({ "data": incidents, "meta": { "total": incidents.len() } })))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let store = state.store.clone();
    let incident = tokio::task::spawn_blocking(move || store.find_incident(id))
        .await
        .map_err(StoreError::from)??;
    Ok(match incident {
        Some(incident) => Json(json!({ "data": incident })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("incident {id} not found") })),
        )
            .into_response(),
    })
}

async fn upstream(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.engine.upstream().snapshot() }))
}
