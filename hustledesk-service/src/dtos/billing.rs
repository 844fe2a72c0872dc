use crate::models::{Plan, PlanLimits, Subscription, UsageSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    #[default]
    Monthly,
    Yearly,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub org_id: Uuid,
    pub plan: Plan,
    #[serde(default)]
    pub interval: BillingInterval,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub org_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub limits: PlanLimits,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        let limits = subscription.plan().limits();
        Self {
            subscription,
            limits,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub plan: Plan,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
    pub usage: UsageSummary,
    pub limits: PlanLimits,
}
