use crate::models::Role;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::ValidateRequest;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrgRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    pub slug: Option<String>,
    #[validate(length(equal = 2, message = "Country must be an ISO 3166 alpha-2 code"))]
    pub country: Option<String>,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: Option<String>,
}

impl ValidateRequest for CreateOrgRequest {}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOutletRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

impl ValidateRequest for CreateOutletRequest {}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(length(min = 1, max = 255, message = "user_id is required"))]
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub allowed_outlet_ids: Vec<Uuid>,
}

impl ValidateRequest for AddMemberRequest {}
