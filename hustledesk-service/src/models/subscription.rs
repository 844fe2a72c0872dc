//! SaaS plan, billing status and usage metering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Free,
    Starter,
    Growth,
    Scale,
}

/// Caps attached to a plan; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub price_cents: i64,
    pub max_outlets: Option<i64>,
    pub max_staff: Option<i64>,
    pub max_records: Option<i64>,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Starter => "STARTER",
            Plan::Growth => "GROWTH",
            Plan::Scale => "SCALE",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "STARTER" => Plan::Starter,
            "GROWTH" => Plan::Growth,
            "SCALE" => Plan::Scale,
            _ => Plan::Free,
        }
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            Plan::Free => PlanLimits {
                price_cents: 0,
                max_outlets: Some(1),
                max_staff: Some(1),
                max_records: Some(100),
            },
            Plan::Starter => PlanLimits {
                price_cents: 20_000,
                max_outlets: Some(2),
                max_staff: Some(5),
                max_records: None,
            },
            Plan::Growth => PlanLimits {
                price_cents: 50_000,
                max_outlets: Some(5),
                max_staff: Some(20),
                max_records: None,
            },
            Plan::Scale => PlanLimits {
                price_cents: 0,
                max_outlets: None,
                max_staff: None,
                max_records: None,
            },
        }
    }
}

impl PlanLimits {
    pub fn allows(limit: Option<i64>, current: i64) -> bool {
        limit.map_or(true, |max| current < max)
    }
}

/// Processor-side state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingStatus {
    Active,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Trialing,
    Unpaid,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Active => "ACTIVE",
            BillingStatus::PastDue => "PAST_DUE",
            BillingStatus::Canceled => "CANCELED",
            BillingStatus::Incomplete => "INCOMPLETE",
            BillingStatus::IncompleteExpired => "INCOMPLETE_EXPIRED",
            BillingStatus::Trialing => "TRIALING",
            BillingStatus::Unpaid => "UNPAID",
        }
    }

    /// Map a Stripe subscription status; unknown values count as active.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "past_due" => BillingStatus::PastDue,
            "canceled" => BillingStatus::Canceled,
            "incomplete" => BillingStatus::Incomplete,
            "incomplete_expired" => BillingStatus::IncompleteExpired,
            "trialing" => BillingStatus::Trialing,
            "unpaid" => BillingStatus::Unpaid,
            _ => BillingStatus::Active,
        }
    }

    /// Whether the org keeps access to paid features.
    pub fn grants_access(&self) -> bool {
        matches!(self, BillingStatus::Active | BillingStatus::Trialing)
    }
}

pub const SUBSCRIPTION_ACTIVE: &str = "ACTIVE";
pub const SUBSCRIPTION_INACTIVE: &str = "INACTIVE";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub org_id: Uuid,
    pub plan: String,
    pub status: String,
    pub billing_status: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn plan(&self) -> Plan {
        Plan::from_string(&self.plan)
    }
}

/// Subscription fields pushed by a `customer.subscription.*` event.
#[derive(Debug, Clone)]
pub struct SubscriptionSync {
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub plan: Plan,
    pub billing_status: BillingStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingInvoice {
    pub billing_invoice_id: Uuid,
    pub org_id: Uuid,
    pub stripe_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub invoice_pdf: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub paid_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertBillingInvoice {
    pub stripe_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub invoice_pdf: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// State change carried by a verified Stripe webhook event.
#[derive(Debug, Clone)]
pub enum BillingEventAction {
    SyncSubscription(SubscriptionSync),
    SubscriptionDeleted {
        stripe_customer_id: String,
    },
    InvoicePaid {
        stripe_customer_id: String,
        invoice: UpsertBillingInvoice,
    },
    PaymentFailed {
        stripe_customer_id: String,
        stripe_subscription_id: Option<String>,
    },
    /// Stored for the audit trail without changing state.
    Ignored {
        stripe_customer_id: Option<String>,
    },
}

impl BillingEventAction {
    pub fn stripe_customer_id(&self) -> Option<&str> {
        match self {
            BillingEventAction::SyncSubscription(sync) => Some(&sync.stripe_customer_id),
            BillingEventAction::SubscriptionDeleted { stripe_customer_id }
            | BillingEventAction::InvoicePaid {
                stripe_customer_id, ..
            }
            | BillingEventAction::PaymentFailed {
                stripe_customer_id, ..
            } => Some(stripe_customer_id),
            BillingEventAction::Ignored { stripe_customer_id } => stripe_customer_id.as_deref(),
        }
    }
}

/// Metered counters kept per subscription period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    Orders,
    Invoices,
    Products,
    StorageMb,
}

impl UsageMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageMetric::Orders => "orders",
            UsageMetric::Invoices => "invoices",
            UsageMetric::Products => "products",
            UsageMetric::StorageMb => "storage_mb",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageRecord {
    pub metric_name: String,
    pub metric_value: i64,
}

/// Usage for the current period with zero defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub orders: i64,
    pub invoices: i64,
    pub products: i64,
    pub storage_mb: i64,
}

impl UsageSummary {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let mut summary = UsageSummary::default();
        for record in records {
            match record.metric_name.as_str() {
                "orders" => summary.orders = record.metric_value,
                "invoices" => summary.invoices = record.metric_value,
                "products" => summary.products = record.metric_value,
                "storage_mb" => summary.storage_mb = record.metric_value,
                _ => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_status_mapping() {
        assert_eq!(BillingStatus::from_stripe("active"), BillingStatus::Active);
        assert_eq!(BillingStatus::from_stripe("past_due"), BillingStatus::PastDue);
        assert_eq!(
            BillingStatus::from_stripe("incomplete_expired"),
            BillingStatus::IncompleteExpired
        );
        assert_eq!(BillingStatus::from_stripe("trialing"), BillingStatus::Trialing);
        assert_eq!(BillingStatus::from_stripe("paused"), BillingStatus::Active);
        assert!(BillingStatus::Trialing.grants_access());
        assert!(!BillingStatus::PastDue.grants_access());
    }

    #[test]
    fn free_plan_caps() {
        let free = Plan::Free.limits();
        assert!(PlanLimits::allows(free.max_outlets, 0));
        assert!(!PlanLimits::allows(free.max_outlets, 1));
        assert!(PlanLimits::allows(Plan::Scale.limits().max_outlets, 10_000));
    }

    #[test]
    fn usage_ignores_unknown_metrics() {
        let records = vec![
            UsageRecord {
                metric_name: "orders".into(),
                metric_value: 12,
            },
            UsageRecord {
                metric_name: "sms".into(),
                metric_value: 99,
            },
        ];
        let summary = UsageSummary::from_records(&records);
        assert_eq!(summary.orders, 12);
        assert_eq!(summary.invoices, 0);
    }
}
