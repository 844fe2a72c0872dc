use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a payment was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tender {
    Cash,
    Mpesa,
}

impl Tender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tender::Cash => "CASH",
            Tender::Mpesa => "MPESA",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "MPESA" => Tender::Mpesa,
            _ => Tender::Cash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub org_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub tender: String,
    pub amount_cents: i64,
    pub mpesa_ref: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment against an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoicePayment {
    pub tender: Tender,
    pub amount_cents: i64,
    pub mpesa_ref: Option<String>,
    pub created_by: Option<String>,
}
