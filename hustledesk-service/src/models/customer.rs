use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Customer with a running receivable balance in cents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub balance_cents: i64,
    pub last_activity_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Compact customer reference embedded in order and invoice listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerSummary {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}
