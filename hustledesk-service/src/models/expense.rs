use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Suggested expense categories; any 1..=50 char category is accepted.
pub const EXPENSE_CATEGORIES: [&str; 12] = [
    "Rent",
    "Utilities",
    "Supplies",
    "Marketing",
    "Transport",
    "Food & Drinks",
    "Equipment",
    "Repairs",
    "Insurance",
    "Licenses",
    "Professional Services",
    "Other",
];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub expense_id: Uuid,
    pub org_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub category: String,
    pub amount_cents: i64,
    pub payee: Option<String>,
    pub note: Option<String>,
    pub attachment_url: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListExpensesFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet_id: Option<Uuid>,
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}
