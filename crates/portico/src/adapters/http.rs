//! HTTP adapter: builds and serves the axum router.
//!
//! Mounts the domain routes under `/domains`, plus health, unified status
//! and the OpenAPI document.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State as AxumState;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use portico_common::capability::{Capability, CapabilityStatus};
use portico_common::error::ErrorCode;
use portico_common::http::error_response;
use portico_provision::renewal::RenewalRuntime;
use portico_provision::ProvisioningController;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const STATUS: &str = "/v1/status";
    pub const OPENAPI: &str = "/openapi.json";
}

#[derive(Clone)]
struct AppState {
    controller: Arc<ProvisioningController>,
    renewal: Option<Arc<RenewalRuntime>>,
    started_at: Instant,
}

pub fn router(
    controller: Arc<ProvisioningController>,
    renewal: Option<Arc<RenewalRuntime>>,
    started_at: Instant,
) -> Router {
    let state = AppState {
        controller: controller.clone(),
        renewal,
        started_at,
    };

    Router::new()
        .route(paths::HEALTHZ, get(health))
        .route(paths::STATUS, get(unified_status_handler))
        .route(paths::OPENAPI, get(openapi_handler))
        .with_state(state)
        .nest(
            portico_provision::http::paths::PREFIX,
            portico_provision::http::routes(controller),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start(app: Router, bind: String, port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind.as_str(), port)).await?;
    tracing::info!("HTTP adapter listening on {}:{}", bind, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    tracing::debug!("HTTP adapter stopped");
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "OK"
}

async fn unified_status_handler(AxumState(state): AxumState<AppState>) -> Json<serde_json::Value> {
    let mut capabilities = vec![Capability::status(state.controller.as_ref())];

    capabilities.push(match state.renewal {
        Some(ref runtime) => {
            let running = runtime.status().await.running;
            let summary = if running { "running" } else { "stopped" };
            CapabilityStatus::new("renewal", summary, running)
        }
        None => CapabilityStatus::new("renewal", "disabled", false),
    });

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "daemon": true,
        "capabilities": capabilities,
    }))
}

async fn openapi_handler() -> impl IntoResponse {
    Json(crate::openapi::build_openapi())
}

async fn not_found() -> axum::response::Response {
    error_response(ErrorCode::NotFound, "no such route")
}
