//! HTTP server assembly using Axum.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tasknest_core::NestConfig;
use tasknest_scheduler::{HttpBroker, HttpJobService, SchedulerRuntime};
use tasknest_store::{SqliteKv, TaskStore};

use crate::stream::StreamHub;

/// Shared state for the gateway server.
pub struct AppState {
    pub config: NestConfig,
    pub store: Arc<TaskStore>,
    pub runtime: Arc<SchedulerRuntime>,
    pub hub: Arc<StreamHub>,
    pub start_time: std::time::Instant,
}

/// The authenticated owner, injected by the auth middleware. This is the
/// only place an owner identifier enters a request's processing.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

/// Token auth middleware — resolves X-Auth-Token (or ?token=) against
/// the configured token→owner map.
async fn require_token(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut token = req
        .headers()
        .get("X-Auth-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if token.is_empty()
        && let Some(query) = req.uri().query()
    {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                token = value.to_string();
            }
        }
    }

    if let Some(owner) = state.config.auth.owner_for(&token) {
        req.extensions_mut().insert(OwnerId(owner.to_string()));
        return next.run(req).await;
    }

    axum::response::Response::builder()
        .status(axum::http::StatusCode::UNAUTHORIZED)
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(
            serde_json::json!({"ok": false, "error": "unauthorized — invalid or missing token"})
                .to_string(),
        ))
        .unwrap_or_default()
}

/// Public liveness probe.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build the Axum router with all routes.
pub fn build_router(shared: Arc<AppState>) -> Router {
    // Protected routes — require a valid owner token.
    let protected = Router::new()
        .route(
            "/api/v1/tasks",
            get(super::routes::list_tasks).post(super::routes::create_task),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(super::routes::get_task)
                .put(super::routes::update_task)
                .delete(super::routes::delete_task),
        )
        .route(
            "/api/v1/tasks/{id}/complete",
            post(super::routes::complete_task),
        )
        .route(
            "/api/v1/notifications",
            get(super::routes::drain_notifications),
        )
        .route("/api/v1/status", get(super::routes::status))
        .route("/api/v1/stream", get(super::stream::stream_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_token,
        ));

    // Public routes — liveness plus the job-service callback, which
    // authenticates with the callback secret instead of a user token.
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/internal/jobs/fire", post(super::routes::jobs_fire));

    protected
        .merge(public)
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the gateway: open the store, wire the scheduler runtime, spawn
/// its background loops, and serve.
pub async fn start(config: &NestConfig) -> anyhow::Result<()> {
    let db_path = config.store.db_path();
    let engine = SqliteKv::open(&db_path)?;
    let store = Arc::new(TaskStore::new(Arc::new(engine)));
    tracing::info!("💾 store opened at {}", db_path.display());

    let hub = Arc::new(StreamHub::new(
        config.stream.connection_buffer,
        config.stream.offline_queue,
    ));
    let jobs = Arc::new(HttpJobService::new(&config.jobs));
    let broker = Arc::new(HttpBroker::new(&config.broker));
    if config.jobs.endpoint.is_empty() {
        tracing::warn!("⚠️ no job service endpoint configured — reminders run on local timers");
    }
    if config.broker.endpoint.is_empty() {
        tracing::warn!("⚠️ no broker endpoint configured — events will queue");
    }

    let (runtime, fired_rx) = SchedulerRuntime::new(store.clone(), jobs, broker, hub.clone());
    runtime.spawn(fired_rx, config.jobs.retry_interval_secs);
    tracing::info!(
        "⏱️ scheduler runtime started (retry drain every {}s)",
        config.jobs.retry_interval_secs
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        runtime,
        hub,
        start_time: std::time::Instant::now(),
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 tasknest gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
