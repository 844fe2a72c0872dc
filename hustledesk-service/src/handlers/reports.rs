//! Period summary report.

use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::dtos::reports::ReportQuery;
use crate::dtos::ApiResponse;
use crate::middleware::{require_member, require_outlet_access, AuthUser};
use crate::models::ReportSummary;
use crate::utils::{previous_period, today_range_eat};
use crate::AppState;
use service_core::error::AppError;

/// Requested range, or today in EAT when either bound is missing.
fn report_range(
    query: &ReportQuery,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    match (query.from, query.to) {
        (Some(from), Some(to)) if from > to => Err(AppError::BadRequest(anyhow::anyhow!(
            "from must not be after to"
        ))),
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Ok(today_range_eat(now)),
    }
}

/// GET /api/orgs/:org_id/reports/summary
#[instrument(skip(state, user, query))]
pub async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<ReportSummary>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    if let Some(outlet_id) = query.outlet {
        require_outlet_access(&member, outlet_id)?;
    }

    let (from, to) = report_range(&query, Utc::now())?;
    let (prev_from, prev_to) = previous_period(from, to);

    let (sales, expenses, prev_sales, prev_expenses) = tokio::try_join!(
        state.db.sales_totals(org_id, from, to, query.outlet),
        state.db.expense_totals(org_id, from, to, query.outlet),
        state.db.sales_totals(org_id, prev_from, prev_to, query.outlet),
        state.db.expense_totals(org_id, prev_from, prev_to, query.outlet),
    )?;

    Ok(Json(ApiResponse::new(ReportSummary::build(
        (from, to),
        (prev_from, prev_to),
        sales,
        expenses,
        prev_sales,
        prev_expenses,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn inverted_range_is_rejected() {
        let query = ReportQuery {
            from: Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            outlet: None,
        };
        assert!(report_range(&query, Utc::now()).is_err());
    }

    #[test]
    fn missing_bound_falls_back_to_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let query = ReportQuery {
            from: Some(now),
            to: None,
            outlet: None,
        };
        assert_eq!(report_range(&query, now).unwrap(), today_range_eat(now));
    }
}
