use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Operational to-do item, optionally tied to an outlet and assignee.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub task_id: Uuid,
    pub org_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}
