//! Catalog products and their stock movements.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Units a product can be sold in.
pub const PRODUCT_UNITS: [&str; 12] = [
    "each", "kg", "g", "liter", "ml", "meter", "cm", "piece", "box", "pack", "bottle", "bag",
];

pub const DEFAULT_UNIT: &str = "each";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub unit: String,
    pub tax_rate: Decimal,
    pub low_stock_threshold: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Product plus on-hand quantity summed from its movements.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductWithStock {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub stock_quantity: Decimal,
}

impl ProductWithStock {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= Decimal::from(self.product.low_stock_threshold)
    }
}

/// Kind of stock movement. Sales are negative, purchases and returns positive,
/// adjustments either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Adjustment,
    Sale,
    Purchase,
    Return,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Sale => "SALE",
            MovementType::Purchase => "PURCHASE",
            MovementType::Return => "RETURN",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "SALE" => MovementType::Sale,
            "PURCHASE" => MovementType::Purchase,
            "RETURN" => MovementType::Return,
            _ => MovementType::Adjustment,
        }
    }

    /// Quantity as stored: purchases and returns add stock, adjustments keep their sign.
    pub fn signed_quantity(&self, quantity: Decimal) -> Decimal {
        match self {
            MovementType::Sale => -quantity.abs(),
            MovementType::Purchase | MovementType::Return => quantity.abs(),
            MovementType::Adjustment => quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryMovement {
    pub movement_id: Uuid,
    pub org_id: Uuid,
    pub product_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub movement_type: String,
    pub quantity: Decimal,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a stock movement.
#[derive(Debug, Clone)]
pub struct CreateMovement {
    pub org_id: Uuid,
    pub product_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub note: Option<String>,
    pub created_by: String,
}
