//! Mobile-money transaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpesaKind {
    #[serde(rename = "C2B")]
    C2b,
    #[serde(rename = "STK")]
    Stk,
}

impl MpesaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaKind::C2b => "C2B",
            MpesaKind::Stk => "STK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MpesaStatus {
    Pending,
    Success,
    Failed,
}

impl MpesaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaStatus::Pending => "PENDING",
            MpesaStatus::Success => "SUCCESS",
            MpesaStatus::Failed => "FAILED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "SUCCESS" => MpesaStatus::Success,
            "FAILED" => MpesaStatus::Failed,
            _ => MpesaStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MpesaTransaction {
    pub mpesa_transaction_id: Uuid,
    pub org_id: Option<Uuid>,
    pub kind: String,
    pub status: String,
    pub amount_cents: Option<i64>,
    pub msisdn: Option<String>,
    pub reference: Option<String>,
    pub raw: serde_json::Value,
    pub matched_invoice_id: Option<Uuid>,
    pub provider: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl MpesaTransaction {
    pub fn status(&self) -> MpesaStatus {
        MpesaStatus::from_string(&self.status)
    }
}

/// Pending STK request stored when the push is sent.
#[derive(Debug, Clone)]
pub struct CreatePendingStk {
    pub org_id: Uuid,
    pub invoice_id: Uuid,
    pub checkout_request_id: String,
    pub amount_cents: i64,
    pub msisdn: String,
    pub raw: serde_json::Value,
}

/// Customer-initiated payment notification.
#[derive(Debug, Clone)]
pub struct C2bPayment {
    pub trans_id: String,
    pub amount_cents: i64,
    pub msisdn: Option<String>,
    pub bill_reference: Option<String>,
    pub raw: serde_json::Value,
}

/// Final outcome of an STK push.
#[derive(Debug, Clone)]
pub struct StkOutcome {
    pub checkout_request_id: String,
    pub success: bool,
    pub amount_cents: Option<i64>,
    pub receipt_number: Option<String>,
    pub msisdn: Option<String>,
    pub raw: serde_json::Value,
}

/// What a webhook did, reported back for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Duplicate,
    Unmatched,
    Failed,
    Applied { invoice_id: Uuid, status: super::InvoiceStatus },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Unmatched => "unmatched",
            ReconcileOutcome::Failed => "failed",
            ReconcileOutcome::Applied { .. } => "applied",
        }
    }
}
