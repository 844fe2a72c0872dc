//! HTTP handlers for hustledesk-service.

pub mod billing;
pub mod catalog;
pub mod expenses;
pub mod invoices;
pub mod mpesa;
pub mod orders;
pub mod orgs;
pub mod reports;
pub mod tasks;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::require_outlet_access;
use crate::models::{Member, Outlet};
use crate::services::get_metrics;
use crate::AppState;
use service_core::error::AppError;

/// Outlet must exist in the org (404) and be usable by the member (403).
pub(crate) async fn ensure_outlet(
    state: &AppState,
    member: &Member,
    org_id: Uuid,
    outlet_id: Uuid,
) -> Result<Outlet, AppError> {
    let outlet = state
        .db
        .get_outlet(org_id, outlet_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Outlet not found")))?;
    require_outlet_access(member, outlet_id)?;
    Ok(outlet)
}

/// Liveness probe; reports 503 when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": state.config.service_name,
                "version": state.config.service_version,
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": "database unavailable",
                })),
            )
        }
    }
}

pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready" })),
            )
        }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
