//! Stripe client for SaaS subscriptions.
//!
//! Form-encoded REST calls for customers, Checkout and the billing portal,
//! plus `Stripe-Signature` verification and event decoding for webhooks.

use crate::config::StripeConfig;
use crate::models::{BillingEventAction, BillingStatus, SubscriptionSync, UpsertBillingInvoice};
use crate::services::metrics::record_upstream;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::utils::{constant_time_eq, hmac_sha256_hex};
use std::time::Duration;
use uuid::Uuid;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;
pub const TRIAL_PERIOD_DAYS: u32 = 14;
const PROVIDER: &str = "stripe";

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Billing is not configured")]
    NotConfigured,
    #[error("Stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Stripe error: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(&'static str),
}

impl From<StripeError> for AppError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::NotConfigured => AppError::ServiceUnavailable(err.to_string()),
            StripeError::InvalidSignature(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            StripeError::Transport(_) | StripeError::Api { .. } => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.secret_key.is_some()
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, StripeError> {
        let key = self
            .config
            .secret_key
            .as_ref()
            .ok_or(StripeError::NotConfigured)?;

        let url = format!("{}{}", self.config.api_base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key.expose_secret())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            record_upstream(PROVIDER, operation, false);
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| StripeErrorDetail {
                    message: None,
                    kind: None,
                });
            let message = detail
                .message
                .unwrap_or_else(|| format!("request failed with status {}", status));
            tracing::error!(
                operation,
                status = status.as_u16(),
                error_type = ?detail.kind,
                error = %message,
                "Stripe API error"
            );
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        record_upstream(PROVIDER, operation, true);
        Ok(response.json().await?)
    }

    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        org_id: Uuid,
    ) -> Result<StripeCustomer, StripeError> {
        let customer: StripeCustomer = self
            .post_form(
                "create_customer",
                "/v1/customers",
                &[
                    ("email", email.to_string()),
                    ("name", name.to_string()),
                    ("metadata[orgId]", org_id.to_string()),
                ],
            )
            .await?;

        tracing::info!(org_id = %org_id, customer_id = %customer.id, "Stripe customer created");
        Ok(customer)
    }

    /// Subscription-mode Checkout session with a trial.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        org_id: Uuid,
    ) -> Result<CheckoutSession, StripeError> {
        self.post_form(
            "create_checkout_session",
            "/v1/checkout/sessions",
            &[
                ("mode", "subscription".to_string()),
                ("customer", customer_id.to_string()),
                ("line_items[0][price]", price_id.to_string()),
                ("line_items[0][quantity]", "1".to_string()),
                ("success_url", success_url.to_string()),
                ("cancel_url", cancel_url.to_string()),
                ("metadata[orgId]", org_id.to_string()),
                (
                    "subscription_data[trial_period_days]",
                    TRIAL_PERIOD_DAYS.to_string(),
                ),
            ],
        )
        .await
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, StripeError> {
        self.post_form(
            "create_portal_session",
            "/v1/billing_portal/sessions",
            &[
                ("customer", customer_id.to_string()),
                ("return_url", return_url.to_string()),
            ],
        )
        .await
    }
}

/// Check a `Stripe-Signature` header (`t=…,v1=…[,v1=…]`) against the raw body.
///
/// The signed payload is `"{t}.{body}"`. Any matching `v1` entry is accepted as
/// long as `t` is within [`SIGNATURE_TOLERANCE_SECS`] of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature("missing v1 signature"));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(StripeError::InvalidSignature("timestamp outside tolerance"));
    }

    let mut signed = format!("{}.", timestamp).into_bytes();
    signed.extend_from_slice(payload);

    let expected = hmac_sha256_hex(secret.as_bytes(), &signed)
        .map_err(|_| StripeError::InvalidSignature("unusable secret"))?;

    if signatures
        .iter()
        .any(|sig| constant_time_eq(expected.as_bytes(), sig.as_bytes()))
    {
        Ok(())
    } else {
        tracing::warn!("Stripe webhook signature mismatch");
        Err(StripeError::InvalidSignature("signature mismatch"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    trial_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    price: ItemPrice,
}

#[derive(Debug, Deserialize)]
struct ItemPrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    customer: String,
    subscription: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    currency: String,
    status: Option<String>,
    invoice_pdf: Option<String>,
    hosted_invoice_url: Option<String>,
    period_start: Option<i64>,
    period_end: Option<i64>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl StripeEvent {
    fn object_customer(&self) -> Option<String> {
        self.data
            .object
            .get("customer")
            .and_then(|c| c.as_str())
            .map(str::to_string)
    }

    fn parse_object<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.data.object.clone()) {
            Ok(object) => Some(object),
            Err(e) => {
                tracing::warn!(
                    event_id = %self.id,
                    event_type = %self.event_type,
                    error = %e,
                    "Unreadable Stripe event object"
                );
                None
            }
        }
    }

    /// Decode the state change this event carries.
    ///
    /// Unhandled types and unreadable objects become `Ignored` so they are
    /// still logged once.
    pub fn action(&self, config: &StripeConfig) -> BillingEventAction {
        let action = match self.event_type.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => self
                .parse_object::<SubscriptionObject>()
                .map(|sub| {
                    let plan = sub
                        .items
                        .data
                        .first()
                        .map(|item| config.plan_for_price(&item.price.id))
                        .unwrap_or(crate::models::Plan::Free);
                    BillingEventAction::SyncSubscription(SubscriptionSync {
                        stripe_customer_id: sub.customer,
                        stripe_subscription_id: sub.id,
                        plan,
                        billing_status: BillingStatus::from_stripe(&sub.status),
                        current_period_start: timestamp(sub.current_period_start),
                        current_period_end: timestamp(sub.current_period_end),
                        trial_end: timestamp(sub.trial_end),
                        cancel_at_period_end: sub.cancel_at_period_end,
                        canceled_at: timestamp(sub.canceled_at),
                    })
                }),
            "customer.subscription.deleted" => self.object_customer().map(|customer| {
                BillingEventAction::SubscriptionDeleted {
                    stripe_customer_id: customer,
                }
            }),
            "invoice.payment_succeeded" => {
                self.parse_object::<InvoiceObject>()
                    .map(|inv| BillingEventAction::InvoicePaid {
                        stripe_customer_id: inv.customer,
                        invoice: UpsertBillingInvoice {
                            stripe_invoice_id: inv.id,
                            amount_cents: inv.amount_paid,
                            currency: inv.currency,
                            status: inv.status.unwrap_or_else(|| "paid".to_string()),
                            invoice_pdf: inv.invoice_pdf,
                            hosted_invoice_url: inv.hosted_invoice_url,
                            period_start: timestamp(inv.period_start),
                            period_end: timestamp(inv.period_end),
                        },
                    })
            }
            "invoice.payment_failed" => {
                self.parse_object::<InvoiceObject>()
                    .map(|inv| BillingEventAction::PaymentFailed {
                        stripe_customer_id: inv.customer,
                        stripe_subscription_id: inv.subscription,
                    })
            }
            _ => None,
        };

        action.unwrap_or_else(|| BillingEventAction::Ignored {
            stripe_customer_id: self.object_customer(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanPrices;
    use crate::models::Plan;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "whsec_test";

    fn config(base_url: &str) -> StripeConfig {
        StripeConfig {
            secret_key: Some(Secret::new("sk_test_123".to_string())),
            webhook_secret: Some(Secret::new(SECRET.to_string())),
            api_base_url: base_url.to_string(),
            starter: PlanPrices {
                monthly: Some("price_starter".to_string()),
                yearly: None,
            },
            growth: PlanPrices {
                monthly: Some("price_growth".to_string()),
                yearly: Some("price_growth_yearly".to_string()),
            },
            scale: PlanPrices::default(),
        }
    }

    fn sign(payload: &str, t: i64) -> String {
        let sig = hmac_sha256_hex(SECRET.as_bytes(), format!("{}.{}", t, payload).as_bytes())
            .unwrap();
        format!("t={},v1={}", t, sig)
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, 1_700_000_000);
        assert!(verify_webhook_signature(payload.as_bytes(), &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let payload = r#"{"id":"evt_1"}"#;
        let signed = sign(payload, 1_700_000_000);
        let (t, v1) = signed.split_once(',').unwrap();
        let header = format!("{},v1=deadbeef, {}", t, v1);
        assert!(verify_webhook_signature(payload.as_bytes(), &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn rejects_stale_and_tampered_payloads() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = sign(payload, 1_700_000_000);

        let stale = verify_webhook_signature(payload.as_bytes(), &header, SECRET, 1_700_000_301);
        assert!(matches!(stale, Err(StripeError::InvalidSignature("timestamp outside tolerance"))));

        let tampered =
            verify_webhook_signature(br#"{"id":"evt_2"}"#, &header, SECRET, 1_700_000_000);
        assert!(matches!(tampered, Err(StripeError::InvalidSignature("signature mismatch"))));

        let missing = verify_webhook_signature(payload.as_bytes(), "v1=abc", SECRET, 0);
        assert!(matches!(missing, Err(StripeError::InvalidSignature("missing timestamp"))));
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", t);
            let result = verify_webhook_signature(b"{}", &header, SECRET, 1_700_000_000);
            assert!(matches!(
                result,
                Err(StripeError::InvalidSignature("timestamp outside tolerance"))
            ));
        }
    }

    #[test]
    fn subscription_update_maps_price_to_plan() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_sub",
            "type": "customer.subscription.updated",
            "data": {"object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "trialing",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "trial_end": 1_701_209_600,
                "cancel_at_period_end": false,
                "items": {"data": [{"price": {"id": "price_growth_yearly"}}]}
            }}
        }))
        .unwrap();

        match event.action(&config("http://unused")) {
            BillingEventAction::SyncSubscription(sync) => {
                assert_eq!(sync.plan, Plan::Growth);
                assert_eq!(sync.billing_status, BillingStatus::Trialing);
                assert_eq!(sync.stripe_customer_id, "cus_1");
                assert_eq!(
                    sync.current_period_start.map(|d| d.timestamp()),
                    Some(1_700_000_000)
                );
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn unknown_price_falls_back_to_free_and_unknown_type_is_ignored() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_sub",
            "type": "customer.subscription.created",
            "data": {"object": {
                "id": "sub_1", "customer": "cus_1", "status": "active",
                "items": {"data": [{"price": {"id": "price_other"}}]}
            }}
        }))
        .unwrap();
        assert!(matches!(
            event.action(&config("http://unused")),
            BillingEventAction::SyncSubscription(SubscriptionSync { plan: Plan::Free, .. })
        ));

        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_x",
            "type": "charge.refunded",
            "data": {"object": {"customer": "cus_9"}}
        }))
        .unwrap();
        match event.action(&config("http://unused")) {
            BillingEventAction::Ignored { stripe_customer_id } => {
                assert_eq!(stripe_customer_id.as_deref(), Some("cus_9"))
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn checkout_session_is_form_encoded_with_trial() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("subscription_data%5Btrial_period_days%5D=14"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(config(&server.uri()));
        let session = client
            .create_checkout_session(
                "cus_1",
                "price_starter",
                "https://app/success",
                "https://app/cancel",
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
    }

    #[tokio::test]
    async fn api_errors_surface_stripe_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/billing_portal/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": "No such customer: 'cus_x'"}
            })))
            .mount(&server)
            .await;

        let client = StripeClient::new(config(&server.uri()));
        let err = client
            .create_portal_session("cus_x", "https://app/billing")
            .await
            .unwrap_err();
        assert!(matches!(err, StripeError::Api { status: 400, ref message } if message == "No such customer: 'cus_x'"));
        assert!(matches!(AppError::from(err), AppError::BadGateway(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_is_unavailable() {
        let mut cfg = config("http://localhost");
        cfg.secret_key = None;
        let client = StripeClient::new(cfg);
        assert!(!client.is_configured());
        let err = client
            .create_customer("a@b.co", "Shop", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(AppError::from(err), AppError::ServiceUnavailable(_)));
    }
}
