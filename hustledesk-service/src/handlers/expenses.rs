use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;
use uuid::Uuid;

use super::ensure_outlet;
use crate::dtos::expenses::{CreateExpenseRequest, ExpenseQuery};
use crate::dtos::{ApiResponse, ValidateRequest};
use crate::middleware::{require_member, require_outlet_access, AuthUser};
use crate::models::{Expense, ListExpensesFilter};
use crate::AppState;
use service_core::error::AppError;

/// GET /api/orgs/:org_id/expenses
pub async fn list_expenses(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ApiResponse<Vec<Expense>>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    if let Some(outlet_id) = query.outlet {
        require_outlet_access(&member, outlet_id)?;
    }

    let page = query.pagination();
    let filter = ListExpensesFilter {
        from: query.from,
        to: query.to,
        outlet_id: query.outlet,
        category: query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        limit: page.limit(),
        offset: page.offset(),
    };

    let expenses = state.db.list_expenses(org_id, &filter).await?;
    Ok(Json(ApiResponse::new(expenses)))
}

/// POST /api/orgs/:org_id/expenses
#[instrument(skip(state, user, req))]
pub async fn create_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Expense>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    if let Some(outlet_id) = req.outlet_id {
        ensure_outlet(&state, &member, org_id, outlet_id).await?;
    }

    let expense = state
        .db
        .create_expense(org_id, &req, user.user_id())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(expense))))
}
