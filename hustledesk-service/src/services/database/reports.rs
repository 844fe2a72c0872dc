//! Aggregates behind the period summary report.

use super::{db_error, Database};
use crate::models::{ExpenseTotals, SalesTotals};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

impl Database {
    /// Order totals within `[from, to]`, optionally for one outlet.
    #[instrument(skip(self))]
    pub async fn sales_totals(
        &self,
        org_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        outlet_id: Option<Uuid>,
    ) -> Result<SalesTotals, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sales_totals"])
            .start_timer();

        let totals = sqlx::query_as::<_, SalesTotals>(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT AS total_cents,
                   COALESCE(SUM(paid_cents), 0)::BIGINT AS paid_cents,
                   COUNT(*) AS order_count
            FROM orders
            WHERE org_id = $1
              AND created_utc >= $2 AND created_utc <= $3
              AND ($4::uuid IS NULL OR outlet_id = $4)
            "#,
        )
        .bind(org_id)
        .bind(from)
        .bind(to)
        .bind(outlet_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to aggregate sales", e))?;

        timer.observe_duration();
        Ok(totals)
    }

    #[instrument(skip(self))]
    pub async fn expense_totals(
        &self,
        org_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        outlet_id: Option<Uuid>,
    ) -> Result<ExpenseTotals, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expense_totals"])
            .start_timer();

        let totals = sqlx::query_as::<_, ExpenseTotals>(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total_cents,
                   COUNT(*) AS expense_count
            FROM expenses
            WHERE org_id = $1
              AND created_utc >= $2 AND created_utc <= $3
              AND ($4::uuid IS NULL OR outlet_id = $4)
            "#,
        )
        .bind(org_id)
        .bind(from)
        .bind(to)
        .bind(outlet_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to aggregate expenses", e))?;

        timer.observe_duration();
        Ok(totals)
    }
}
