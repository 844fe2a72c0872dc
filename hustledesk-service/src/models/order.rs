//! Point-of-sale orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::payment::Tender;

pub const ORDER_STATUS_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: Uuid,
    pub org_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub balance_cents: i64,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub org_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: Decimal,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub created_utc: DateTime<Utc>,
}

/// Order row joined with customer/outlet names for listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub outlet_name: Option<String>,
}

/// Order with its line items, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItem>,
}

/// A fully priced line ready to be persisted.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: Decimal,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Everything needed to persist an order in one transaction.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub org_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub tender: Option<Tender>,
    pub note: Option<String>,
    pub created_by: String,
}

impl CreateOrder {
    pub fn balance_cents(&self) -> i64 {
        self.total_cents - self.paid_cents
    }
}
