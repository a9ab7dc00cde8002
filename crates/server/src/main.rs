//! Process bootstrap
//!
//! Wires the owned service instances (latency monitor, audio cache,
//! continuity memory) and the backend clients into the orchestrator, then
//! serves the WebSocket/HTTP surface.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parlo_backends::{
    GeneratorConfig, HttpAnalysisScheduler, HttpGenerator, HttpSynthesizer, HttpTranscriber,
};
use parlo_cache::{AudioCache, AudioCacheConfig, InMemoryKvStore, KvStore};
use parlo_config::Settings;
use parlo_dialog::ContinuityMemory;
use parlo_persistence::{InMemoryStore, WavAudioStore};
use parlo_pipeline::{OrchestratorDeps, TurnOrchestrator};
use parlo_server::{http, state::load_scenarios, state::AppState, websocket};
use parlo_telemetry::LatencyMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,parlo=debug".into()),
        )
        .init();

    let config_path = std::env::var("PARLO_CONFIG").ok();
    let settings = Settings::load(config_path.as_deref().map(Path::new))?;
    settings.validate()?;
    let settings = Arc::new(settings);

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    let timeout = Duration::from_secs(settings.backends.request_timeout_secs);
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let cache = Arc::new(AudioCache::new(
        kv.clone(),
        AudioCacheConfig {
            namespace: settings.cache.namespace.clone(),
            ttl: Duration::from_secs(settings.cache.ttl_secs),
            compress_threshold: settings.cache.compress_threshold_bytes,
        },
    ));
    let monitor = Arc::new(LatencyMonitor::new());
    let continuity = Arc::new(ContinuityMemory::default());

    let deps = OrchestratorDeps {
        stt: Arc::new(HttpTranscriber::new(
            settings.backends.transcription_url.clone(),
            timeout,
        )?),
        llm: Arc::new(HttpGenerator::new(GeneratorConfig {
            endpoint: settings.backends.generation_url.clone(),
            timeout,
            ..Default::default()
        })?),
        tts: Arc::new(HttpSynthesizer::new(
            settings.backends.synthesis_url.clone(),
            timeout,
        )?),
        analyzer: Arc::new(
            HttpAnalysisScheduler::new(settings.backends.analysis_url.clone(), timeout)?
                .with_kv(kv),
        ),
        store: Arc::new(InMemoryStore::new()),
        audio_store: Arc::new(WavAudioStore::new(&settings.audio_store_dir)),
        cache: cache.clone(),
        continuity,
        monitor: monitor.clone(),
    };

    let orchestrator = TurnOrchestrator::new(settings.orchestrator.clone(), deps);
    let _cleanup = orchestrator.spawn_cleanup();

    let scenarios = load_scenarios(Path::new("config/scenarios"))
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load scenarios, continuing without");
            HashMap::new()
        });

    let state = AppState {
        orchestrator,
        monitor,
        cache,
        settings: settings.clone(),
        scenarios: Arc::new(scenarios),
    };

    let app = Router::new()
        .route("/health", get(http::health))
        .route("/metrics/latency", get(http::latency_stats))
        .route("/cache/metrics", get(http::cache_metrics))
        .route("/cache/clear", post(http::cache_clear))
        .route("/ws/:session_id", get(websocket::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    tracing::info!(%addr, "parlo listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
