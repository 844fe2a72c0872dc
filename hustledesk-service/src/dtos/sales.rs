//! Orders, invoices and invoice payments.

use crate::models::{InvoiceStatus, Tender};
use crate::utils::KENYAN_MSISDN;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::utils::Pagination;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::{add_error, ValidateRequest};

/// Largest line quantity accepted.
pub const MAX_QUANTITY: i64 = 1_000_000;

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl OrderQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Item name must be 1-200 characters"))]
    pub name: String,
    #[validate(range(min = 0, max = 1000000000))]
    pub unit_price_cents: i64,
    #[validate(custom(function = "validate_quantity"))]
    pub quantity: Decimal,
}

fn validate_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    let min = Decimal::new(1, 2);
    let max = Decimal::from(MAX_QUANTITY);
    if *quantity < min || *quantity > max {
        let mut error = ValidationError::new("range");
        error.message = Some(format!("quantity must be between {} and {}", min, max).into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub outlet_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "At least one item is required"), nested)]
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Discount cannot be negative"))]
    pub discount_cents: i64,
    pub tender: Option<Tender>,
    #[validate(range(min = 0, message = "Paid amount cannot be negative"))]
    pub paid_amount_cents: Option<i64>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl ValidateRequest for CreateOrderRequest {
    fn extra_checks(&self, errors: &mut ValidationErrors) {
        if self.paid_amount_cents.unwrap_or(0) > 0 && self.tender.is_none() {
            add_error(errors, "tender", "Tender is required when an amount is paid");
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub customer: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl InvoiceQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<LineItemRequest>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

impl ValidateRequest for CreateInvoiceRequest {}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub tender: Tender,
    #[validate(range(min = 1, message = "Amount must be at least 1 cent"))]
    pub amount_cents: i64,
    #[validate(length(min = 1, max = 64))]
    pub mpesa_ref: Option<String>,
}

impl ValidateRequest for RecordPaymentRequest {}

/// Invoice state after a payment, with the payment row.
#[derive(Debug, Serialize)]
pub struct InvoicePaymentResponse {
    pub invoice: crate::models::Invoice,
    pub payment: crate::models::Payment,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StkPushRequest {
    #[validate(regex(path = *KENYAN_MSISDN, message = "Phone must be in the format 254XXXXXXXXX"))]
    pub phone: String,
}

impl ValidateRequest for StkPushRequest {}

#[derive(Debug, Serialize)]
pub struct StkPushResponse {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
    pub amount_kes: i64,
}

#[derive(Debug, Serialize)]
pub struct StkStatusResponse {
    pub transaction: crate::models::MpesaTransaction,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: &str) -> LineItemRequest {
        LineItemRequest {
            product_id: None,
            name: "Delivery".into(),
            unit_price_cents: 20_000,
            quantity: quantity.parse().unwrap(),
        }
    }

    fn order(items: Vec<LineItemRequest>) -> CreateOrderRequest {
        CreateOrderRequest {
            outlet_id: None,
            customer_id: None,
            items,
            discount_cents: 0,
            tender: None,
            paid_amount_cents: None,
            note: None,
        }
    }

    #[test]
    fn order_needs_items() {
        assert!(order(vec![]).validated().is_err());
        assert!(order(vec![item("1")]).validated().is_ok());
    }

    #[test]
    fn quantity_lower_bound() {
        assert!(order(vec![item("0.01")]).validated().is_ok());
        assert!(order(vec![item("0.009")]).validated().is_err());
    }

    #[test]
    fn bad_name_and_quantity_are_reported_per_item() {
        let mut bad = item("0");
        bad.name = String::new();
        let errors = order(vec![item("1"), bad.clone()]).validated().unwrap_err();
        assert!(errors.errors().contains_key("items"));

        let invoice = CreateInvoiceRequest {
            order_id: None,
            customer_id: None,
            due_date: None,
            items: vec![bad],
            note: None,
        };
        assert!(invoice.validated().is_err());
    }

    #[test]
    fn paid_amount_requires_tender() {
        let mut req = order(vec![item("1")]);
        req.paid_amount_cents = Some(500);
        let errors = req.validated().unwrap_err();
        assert!(errors.field_errors().contains_key("tender"));

        req.tender = Some(Tender::Cash);
        assert!(req.validated().is_ok());
    }

    #[test]
    fn stk_phone_format() {
        assert!(StkPushRequest { phone: "254712345678".into() }.validated().is_ok());
        assert!(StkPushRequest { phone: "0712345678".into() }.validated().is_err());
    }
}
