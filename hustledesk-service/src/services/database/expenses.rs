use super::{db_error, Database};
use crate::dtos::expenses::CreateExpenseRequest;
use crate::models::{Expense, ListExpensesFilter};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    #[instrument(skip(self, filter))]
    pub async fn list_expenses(
        &self,
        org_id: Uuid,
        filter: &ListExpensesFilter,
    ) -> Result<Vec<Expense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_expenses"])
            .start_timer();

        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT expense_id, org_id, outlet_id, category, amount_cents, payee, note,
                   attachment_url, created_by, created_utc
            FROM expenses
            WHERE org_id = $1
              AND ($2::timestamptz IS NULL OR created_utc >= $2)
              AND ($3::timestamptz IS NULL OR created_utc <= $3)
              AND ($4::uuid IS NULL OR outlet_id = $4)
              AND ($5::text IS NULL OR category = $5)
            ORDER BY created_utc DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(org_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.outlet_id)
        .bind(&filter.category)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list expenses", e))?;

        timer.observe_duration();
        Ok(expenses)
    }

    #[instrument(skip(self, input), fields(category = %input.category))]
    pub async fn create_expense(
        &self,
        org_id: Uuid,
        input: &CreateExpenseRequest,
        created_by: &str,
    ) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_expense"])
            .start_timer();

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (expense_id, org_id, outlet_id, category, amount_cents, payee,
                                  note, attachment_url, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING expense_id, org_id, outlet_id, category, amount_cents, payee, note,
                      attachment_url, created_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(input.outlet_id)
        .bind(input.category.trim())
        .bind(input.amount_cents)
        .bind(&input.payee)
        .bind(&input.note)
        .bind(&input.attachment_url)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create expense", e))?;

        timer.observe_duration();
        info!(expense_id = %expense.expense_id, amount_cents = expense.amount_cents, "Expense recorded");

        Ok(expense)
    }
}
