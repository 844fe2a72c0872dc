use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;
use uuid::Uuid;

use super::ensure_outlet;
use crate::dtos::tasks::{CreateTaskRequest, TaskQuery};
use crate::dtos::{ApiResponse, ValidateRequest};
use crate::middleware::{require_manager, require_member, AuthUser};
use crate::models::Task;
use crate::AppState;
use service_core::error::AppError;

/// GET /api/orgs/:org_id/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<ApiResponse<Vec<Task>>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let tasks = state
        .db
        .list_tasks(
            org_id,
            query.assigned_to.as_deref(),
            query.include_completed.unwrap_or(false),
        )
        .await?;

    Ok(Json(ApiResponse::new(tasks)))
}

/// POST /api/orgs/:org_id/tasks
#[instrument(skip(state, user, req))]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;
    req.validated()?;

    if let Some(outlet_id) = req.outlet_id {
        ensure_outlet(&state, &member, org_id, outlet_id).await?;
    }
    if let Some(assignee) = req.assigned_to.as_deref() {
        if state.db.get_member(org_id, assignee).await?.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tasks can only be assigned to members"
            )));
        }
    }

    let task = state.db.create_task(org_id, &req, user.user_id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(task))))
}

/// POST /api/orgs/:org_id/tasks/:task_id/complete
///
/// Staff may only complete tasks assigned to them.
#[instrument(skip(state, user))]
pub async fn complete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Task>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;

    let task = state
        .db
        .get_task(org_id, task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Task not found")))?;

    if !member.is_manager_or_owner() && task.assigned_to.as_deref() != Some(user.user_id()) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the assignee can complete this task"
        )));
    }

    let task = state
        .db
        .complete_task(org_id, task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Task not found")))?;

    Ok(Json(ApiResponse::new(task)))
}
