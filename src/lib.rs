//! selfheal -- a minimal self-healing observability loop.
//!
//! A monitor samples a target service, a predictor classifies the recent
//! sample window into anomaly events, and a healer answers each event with
//! one bounded corrective action, recording every attempt as an incident.

pub mod api;
pub mod config;
pub mod demo;
pub mod detect;
pub mod dispatch;
pub mod heal;
pub mod monitor;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::detect::engine::{run_detector_loop, AnomalyDetector};
use crate::dispatch::{run_receiver, ChannelDispatcher, HttpDispatcher};
use crate::heal::{
    ActiveUpstream, HttpHealthProbe, MonitorRestart, ProcessRelauncher, RemediationEngine,
    TaskSupervisor,
};
use crate::monitor::engine::run_monitor_loop;
use crate::monitor::HttpSampler;
use crate::storage::MetricStore;

/// Capacity of the in-process event queue between detector and healer.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Open the configured metric store.
pub fn open_store(config: &Config) -> Result<MetricStore> {
    let path = &config.storage.db_path;
    tracing::info!(db_path = %path.display(), "Initializing database");
    MetricStore::open(path)
        .with_context(|| format!("failed to open metric store at {}", path.display()))
}

fn build_sampler(config: &Config) -> Result<Arc<HttpSampler>> {
    Ok(Arc::new(HttpSampler::new(
        &config.service.name,
        &config.service.target_url,
        config.monitor.request_timeout(),
    )?))
}

fn build_engine(
    config: &Config,
    store: MetricStore,
    recovery: Arc<dyn MonitorRestart>,
) -> Result<Arc<RemediationEngine>> {
    let upstream = Arc::new(ActiveUpstream::new(
        &config.healer.primary_upstream,
        config.healer.backup_upstream.as_deref(),
    ));
    let probe = Arc::new(HttpHealthProbe::new(config.healer.probe_timeout())?);
    Ok(Arc::new(RemediationEngine::new(store, upstream, probe, recovery)))
}

async fn serve_api(config: &Config, state: api::state::AppState) -> Result<()> {
    let addr: std::net::SocketAddr = config
        .healer
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.healer.bind))?;
    let app = api::router(state);

    tracing::info!(%addr, "selfheal API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run the whole loop in one process: sampler, detector, healer and API.
/// Events travel over an in-process channel.
pub async fn serve(config: Config) -> Result<()> {
    // 1. Initialize Storage
    let store = open_store(&config)?;

    // 2. Sampler, under a supervisor the healer can restart
    let sampler = build_sampler(&config)?;
    let poll_every = config.monitor.poll_interval();
    let monitor = {
        let store = store.clone();
        Arc::new(TaskSupervisor::new("monitor", move || {
            run_monitor_loop(sampler.clone(), store.clone(), poll_every)
        }))
    };
    monitor.launch()?;

    // 3. Healer fed by the in-process channel
    let engine = build_engine(&config, store.clone(), monitor.clone())?;
    let (dispatcher, rx) = ChannelDispatcher::new(EVENT_QUEUE_CAPACITY);
    tokio::spawn(run_receiver(rx, engine.clone()));

    // 4. Detector loop (background task)
    let detector = AnomalyDetector::new(store.clone(), config.detector.clone());
    tokio::spawn(run_detector_loop(
        detector.clone(),
        config.service.name.clone(),
        Arc::new(dispatcher),
        config.detector.check_interval(),
    ));

    // 5. API server
    let state = api::state::AppState {
        store,
        detector,
        engine,
    };
    serve_api(&config, state).await
}

/// Sampler only.
pub async fn run_monitor(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let sampler = build_sampler(&config)?;
    run_monitor_loop(sampler, store, config.monitor.poll_interval()).await;
    Ok(())
}

/// Detector only; events are posted to the configured healer endpoint.
pub async fn run_predictor(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let dispatcher = HttpDispatcher::new(&config.dispatch.endpoint, config.dispatch.timeout())?;
    tracing::info!(endpoint = %dispatcher.endpoint(), "Dispatching events over HTTP");

    let detector = AnomalyDetector::new(store, config.detector.clone());
    run_detector_loop(
        detector,
        config.service.name.clone(),
        Arc::new(dispatcher),
        config.detector.check_interval(),
    )
    .await;
    Ok(())
}

/// Healer only: the event endpoint plus the dashboard API. Soft recovery
/// relaunches the monitor as a separate process.
pub async fn run_healer(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let recovery = Arc::new(ProcessRelauncher::new(config.healer.restart_command.clone()));
    let engine = build_engine(&config, store.clone(), recovery)?;
    let detector = AnomalyDetector::new(store.clone(), config.detector.clone());

    let state = api::state::AppState {
        store,
        detector,
        engine,
    };
    serve_api(&config, state).await
}
