use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::utils::Pagination;
use uuid::Uuid;
use validator::Validate;

use super::ValidateRequest;

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet: Option<Uuid>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ExpenseQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    pub outlet_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: String,
    #[validate(range(min = 1, message = "Amount must be at least 1 cent"))]
    pub amount_cents: i64,
    #[validate(length(max = 200))]
    pub payee: Option<String>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    #[validate(url(message = "Attachment must be a valid URL"))]
    pub attachment_url: Option<String>,
}

impl ValidateRequest for CreateExpenseRequest {}
