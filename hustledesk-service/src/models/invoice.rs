//! Invoices and the rule that settles them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::payment::Payment;
use crate::utils::Totals;

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "UNPAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PAID" => InvoiceStatus::Paid,
            "OVERDUE" => InvoiceStatus::Overdue,
            "CANCELLED" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Unpaid,
        }
    }

    /// Whether an invoice in this status may still receive payments.
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Unpaid | InvoiceStatus::Overdue)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub order_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub number: String,
    pub due_date: Option<NaiveDate>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub status: String,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Result of applying a payment to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub paid_cents: i64,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn outstanding_cents(&self) -> i64 {
        (self.total_cents - self.paid_cents).max(0)
    }

    /// Add `amount_cents` to the paid total. Fully covered invoices become PAID;
    /// partially covered ones keep their open status.
    pub fn apply_payment(&self, amount_cents: i64) -> Settlement {
        let paid_cents = self.paid_cents + amount_cents;
        let status = if paid_cents >= self.total_cents {
            InvoiceStatus::Paid
        } else if self.status() == InvoiceStatus::Overdue {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Unpaid
        };
        Settlement { paid_cents, status }
    }
}

/// Invoice row joined with customer name for listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub invoice: Invoice,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub order_created_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: InvoiceRow,
    pub payments: Vec<Payment>,
}

/// Where an invoice's amounts come from.
#[derive(Debug, Clone)]
pub enum InvoiceSource {
    /// Copy totals from an existing order.
    Order(Uuid),
    /// Standalone invoice priced from free-text lines.
    Lines(Totals),
}

#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub org_id: Uuid,
    pub source: InvoiceSource,
    pub customer_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

/// Next number in the `INV-0001` sequence given the latest issued number.
pub fn next_invoice_number(last: Option<&str>) -> String {
    let last = last
        .map(|n| n.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .and_then(|digits| digits.parse::<u64>().ok())
        .unwrap_or(0);
    format!("INV-{:04}", last + 1)
}
