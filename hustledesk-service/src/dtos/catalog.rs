//! Customers, products and stock movements.

use crate::models::{MovementType, PRODUCT_UNITS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::utils::Pagination;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::{add_error, check_decimal_range, ValidateRequest};

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub query: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl CustomerQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"), length(max = 255))]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl ValidateRequest for CreateCustomerRequest {}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub query: Option<String>,
    pub low_stock: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ProductQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn check_product_fields(
    errors: &mut ValidationErrors,
    unit: Option<&str>,
    tax_rate: Option<Decimal>,
) {
    if let Some(unit) = unit {
        if !PRODUCT_UNITS.contains(&unit) {
            add_error(errors, "unit", "Unsupported unit");
        }
    }
    if let Some(rate) = tax_rate {
        check_decimal_range(errors, "tax_rate", rate, Decimal::ZERO, Decimal::ONE_HUNDRED);
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 50))]
    pub sku: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: i64,
    pub unit: Option<String>,
    pub tax_rate: Option<Decimal>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
}

impl ValidateRequest for CreateProductRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        check_product_fields(errors, self.unit.as_deref(), self.tax_rate);
    }
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub sku: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: Option<i64>,
    pub unit: Option<String>,
    pub tax_rate: Option<Decimal>,
    #[validate(range(min = 0))]
    pub low_stock_threshold: Option<i32>,
}

impl ValidateRequest for UpdateProductRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        check_product_fields(errors, self.unit.as_deref(), self.tax_rate);
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InventoryMovementRequest {
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub outlet_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl ValidateRequest for InventoryMovementRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        if self.movement_type == MovementType::Sale {
            add_error(errors, "movement_type", "Sales are recorded through orders");
        }
        if self.quantity.is_zero() {
            add_error(errors, "quantity", "Quantity must be non-zero");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StockLevelResponse {
    pub product_id: Uuid,
    pub stock_quantity: Decimal,
}
