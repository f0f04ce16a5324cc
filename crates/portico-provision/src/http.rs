//! HTTP routes for domain provisioning. The binary mounts these at
//! `/domains`.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::Deserialize;

use portico_common::api::ErrorBody;
use portico_common::error::ErrorCode;
use portico_common::http::error_response;
use portico_dns::{DnsCheck, DnsOutcome};

use crate::{
    DomainConfig, DomainStatusView, ProvisionError, ProvisionReport, ProvisionStep,
    ProvisioningController, ProvisioningState, SetupReport, StepResult, Workspace,
};

// ── Route path constants ────────────────────────────────────────────

pub mod paths {
    pub const PREFIX: &str = "/domains";
    pub const STATUS: &str = "/domains/status";
    pub const STATUS_ONE: &str = "/domains/status/{workspace_id}";
    pub const VERIFY_DNS: &str = "/domains/verify-dns/{workspace_id}";
    pub const PROVISION_NGINX: &str = "/domains/provision/nginx/{workspace_id}";
    pub const PROVISION_SSL: &str = "/domains/provision/ssl/{workspace_id}";
    pub const PROVISION_FULL: &str = "/domains/provision/full/{workspace_id}";
    pub const REMOVE: &str = "/domains/provision/{workspace_id}";
    pub const SETUP_AUTOMATED: &str = "/domains/setup-automated";
    pub const WORKSPACE_DOMAIN: &str = "/domains/workspaces/{workspace_id}/domain";
    pub const WORKSPACE: &str = "/domains/workspaces/{workspace_id}";

    /// Strip the prefix for sub-router mounting.
    pub fn rel(full: &str) -> &str {
        full.strip_prefix(PREFIX).unwrap_or(full)
    }
}

// ── Request types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NginxParams {
    #[serde(default)]
    pub preview_only: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetupRequest {
    pub domain: String,
    pub user_id: String,
}

// ── OpenAPI schema ──────────────────────────────────────────────────

#[derive(utoipa::OpenApi)]
#[openapi(components(schemas(
    DomainStatusView,
    ProvisioningState,
    StepResult,
    ProvisionStep,
    ProvisionReport,
    SetupReport,
    SetupRequest,
    DnsCheck,
    DnsOutcome,
    DomainConfig,
    Workspace,
    ErrorBody
)))]
pub struct DomainsApiDoc;

// ── Router constructor ──────────────────────────────────────────────

pub fn routes(controller: Arc<ProvisioningController>) -> Router {
    use paths::rel;

    Router::new()
        .route(rel(paths::STATUS), get(list_status_handler))
        .route(rel(paths::STATUS_ONE), get(status_handler))
        .route(rel(paths::VERIFY_DNS), post(verify_dns_handler))
        .route(rel(paths::PROVISION_NGINX), post(provision_nginx_handler))
        .route(rel(paths::PROVISION_SSL), post(provision_ssl_handler))
        .route(rel(paths::PROVISION_FULL), post(full_provision_handler))
        .route(rel(paths::REMOVE), delete(remove_handler))
        .route(rel(paths::SETUP_AUTOMATED), post(setup_automated_handler))
        .route(rel(paths::WORKSPACE_DOMAIN), put(change_domain_handler))
        .route(rel(paths::WORKSPACE), delete(delete_workspace_handler))
        .layer(Extension(controller))
}

// ── Handlers ────────────────────────────────────────────────────────

async fn list_status_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
) -> impl IntoResponse {
    Json(controller.list_status().await)
}

async fn status_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    match controller.status(&workspace_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => map_error(e),
    }
}

async fn verify_dns_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    match controller.verify_dns(&workspace_id).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => map_error(e),
    }
}

async fn provision_nginx_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
    Query(params): Query<NginxParams>,
) -> impl IntoResponse {
    if params.preview_only {
        return match controller.preview_nginx_config(&workspace_id).await {
            Ok(config) => Json(serde_json::json!({
                "success": true,
                "config_preview": config,
            }))
            .into_response(),
            Err(e) => map_error(e),
        };
    }
    step_response(controller.provision_nginx(&workspace_id).await)
}

async fn provision_ssl_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    step_response(controller.provision_ssl(&workspace_id).await)
}

async fn full_provision_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    match controller.full_provision(&workspace_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => map_error(e),
    }
}

async fn remove_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    step_response(controller.remove_config(&workspace_id).await)
}

async fn setup_automated_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Json(payload): Json<SetupRequest>,
) -> impl IntoResponse {
    match controller
        .setup_automated(&payload.domain, &payload.user_id)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => map_error(e),
    }
}

async fn change_domain_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
    Json(config): Json<DomainConfig>,
) -> impl IntoResponse {
    match controller.change_domain(&workspace_id, config).await {
        Ok(ws) => Json(ws).into_response(),
        Err(e) => map_error(e),
    }
}

async fn delete_workspace_handler(
    Extension(controller): Extension<Arc<ProvisioningController>>,
    Path(workspace_id): Path<String>,
) -> impl IntoResponse {
    match controller.delete_workspace(&workspace_id).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": format!("Workspace {workspace_id} deleted"),
        }))
        .into_response(),
        Err(e) => map_error(e),
    }
}

/// Step outcomes are `{success, message}`; a failed step is still 200.
fn step_response(result: Result<StepResult, ProvisionError>) -> axum::response::Response {
    match result {
        Ok(step) => Json(serde_json::json!({
            "success": step.success,
            "message": step.message,
        }))
        .into_response(),
        Err(e) => map_error(e),
    }
}

fn map_error(err: ProvisionError) -> axum::response::Response {
    let code = ErrorCode::from(&err);
    if code.http_status() >= 500 {
        tracing::error!(error = %err, "Provisioning request failed");
    }
    error_response(code, err.to_string())
}
