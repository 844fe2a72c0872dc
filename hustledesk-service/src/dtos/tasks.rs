use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::ValidateRequest;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub assigned_to: Option<String>,
    pub include_completed: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub outlet_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub assigned_to: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl ValidateRequest for CreateTaskRequest {}
