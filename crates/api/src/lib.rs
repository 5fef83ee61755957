//! Alert Ingest API Server
//!
//! HTTP surface for webhook ingestion, enrichment mode control, alert history
//! and health. Every instance is stateless; coordination goes through the
//! shared cache when one is configured.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use alerting::{
    AlertIngestionPipeline, Capabilities, FanoutPublisher, LabelClassifier,
    LabelClassifierConfig, LogSink, StaticTargetRegistry, TargetKind, ThresholdFilter,
};
use coordination::{CoordinatorConfig, InstanceHeartbeat, MemoryCache, SharedCache, StatelessCoordinator};
use enrichment::{EnrichmentModeResolver, ResolverConfig};
use serde::Serialize;
use std::sync::Arc;
use storage::AlertRepository;
use tower_http::trace::TraceLayer;
use tracing::{info, subscriber::SetGlobalDefaultError, Level};

pub mod config;
pub mod error;
mod routes;

pub use config::ServiceConfig;
pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: AlertIngestionPipeline,
    pub coordinator: Arc<StatelessCoordinator>,
    /// Alert history
    pub repository: Arc<AlertRepository>,
    pub config: ServiceConfig,
    /// Version string
    pub version: String,
}

/// Wire collaborators according to the configuration
pub fn build_state(config: &ServiceConfig) -> Arc<AppState> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let cache: Option<Arc<dyn SharedCache>> = if config.shared_cache {
        Some(Arc::new(MemoryCache::new()))
    } else {
        info!("No shared cache configured; idempotency is per instance only");
        None
    };

    let coordinator = Arc::new(StatelessCoordinator::new(
        cache.clone(),
        CoordinatorConfig {
            cache_timeout: config.cache_timeout(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_ttl: config.heartbeat_interval() * 2,
            version: version.clone(),
            ..CoordinatorConfig::default()
        },
    ));

    let modes = Arc::new(EnrichmentModeResolver::new(
        cache,
        ResolverConfig {
            default_mode: config.default_mode,
            store_timeout: config.cache_timeout(),
            ..ResolverConfig::default()
        },
    ));

    let repository = Arc::new(AlertRepository::with_retention(config.retention));

    let mut capabilities = Capabilities::none().with_filter(Arc::new(ThresholdFilter::new(
        config.filter.clone(),
        coordinator.clone(),
    )));
    if config.classifier_enabled {
        capabilities = capabilities
            .with_classifier(Arc::new(LabelClassifier::new(LabelClassifierConfig::default())));
    }
    if !config.targets.is_empty() {
        let sink = Arc::new(LogSink);
        let publisher = [
            TargetKind::Rootly,
            TargetKind::PagerDuty,
            TargetKind::Slack,
            TargetKind::Webhook,
        ]
        .into_iter()
        .fold(FanoutPublisher::new(config.publish_timeout()), |p, kind| {
            p.with_sink(kind, sink.clone())
        });
        capabilities = capabilities
            .with_publisher(Arc::new(publisher))
            .with_targets(Arc::new(StaticTargetRegistry::new(
                config.targets.clone(),
                config.metrics_only,
            )));
    }

    let pipeline = AlertIngestionPipeline::new(repository.clone(), capabilities, modes)
        .with_classify_timeout(config.classify_timeout());

    Arc::new(AppState {
        pipeline,
        coordinator,
        repository,
        config: config.clone(),
        version,
    })
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub instance_id: String,
    pub uptime_seconds: u64,
    pub shared_cache: bool,
    pub stored_alerts: usize,
    /// Last heartbeat this instance published, if any
    pub heartbeat: Option<InstanceHeartbeat>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/webhook", post(routes::webhook::receive))
        .route("/webhook/legacy", post(routes::webhook::receive_legacy))
        .route(
            "/api/v1/enrichment/mode",
            get(routes::mode::get_mode).post(routes::mode::set_mode),
        )
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let heartbeat = coordinator.instance_heartbeat(coordinator.instance_id()).await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        instance_id: coordinator.instance_id().to_string(),
        uptime_seconds: coordinator.uptime().as_secs(),
        shared_cache: coordinator.has_shared_cache(),
        stored_alerts: state.repository.alert_count(),
        heartbeat,
    })
}

/// Initialize logging
pub fn init_logging(level: &str, json: bool) -> Result<(), SetGlobalDefaultError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Run the server until Ctrl-C
pub async fn run_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config);
    let heartbeat = state.coordinator.spawn_heartbeat();
    let app = create_router(state);

    info!("Starting API server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    heartbeat.abort();
    Ok(())
}
