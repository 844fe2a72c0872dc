//! SaaS plan: subscription view, usage, Stripe checkout/portal and webhook.

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::HeaderMap,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::dtos::billing::{
    BillingInterval, CheckoutRequest, CheckoutResponse, PortalRequest, PortalResponse,
    SubscriptionResponse, UsageResponse,
};
use crate::dtos::ApiResponse;
use crate::middleware::{require_member, require_role, AuthUser};
use crate::models::{Role, Subscription};
use crate::services::metrics::record_webhook;
use crate::services::stripe::{verify_webhook_signature, StripeEvent};
use crate::AppState;
use service_core::error::AppError;

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

async fn load_subscription(state: &AppState, org_id: Uuid) -> Result<Subscription, AppError> {
    state
        .db
        .get_subscription(org_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))
}

/// GET /api/orgs/:org_id/subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, AppError> {
    require_member(&state.db, org_id, &user).await?;
    let subscription = load_subscription(&state, org_id).await?;
    Ok(Json(ApiResponse::new(subscription.into())))
}

/// GET /api/orgs/:org_id/usage
pub async fn get_usage(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UsageResponse>>, AppError> {
    require_member(&state.db, org_id, &user).await?;
    let subscription = load_subscription(&state, org_id).await?;
    let usage = state.db.current_usage(&subscription).await?;
    let plan = subscription.plan();

    Ok(Json(ApiResponse::new(UsageResponse {
        plan,
        period_start: subscription.current_period_start,
        period_end: subscription.current_period_end,
        usage,
        limits: plan.limits(),
    })))
}

fn billing_url(app_url: &str, org_id: Uuid) -> String {
    format!("{}/org/{}/billing", app_url.trim_end_matches('/'), org_id)
}

/// POST /api/billing/checkout
#[instrument(skip(state, user, req), fields(org_id = %req.org_id, plan = req.plan.as_str()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutResponse>>, AppError> {
    let member = require_member(&state.db, req.org_id, &user).await?;
    require_role(&member, &[Role::Owner])?;

    if !state.stripe.is_configured() {
        return Err(AppError::ServiceUnavailable(
            "Billing is not configured".to_string(),
        ));
    }

    let email = user.email().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("An email address is required for billing"))
    })?;

    let price_id = state
        .stripe
        .config()
        .price_id(req.plan, req.interval == BillingInterval::Yearly)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No price is configured for the {} plan",
                req.plan.as_str()
            ))
        })?
        .to_string();

    let subscription = load_subscription(&state, req.org_id).await?;
    let customer_id = match subscription.stripe_customer_id {
        Some(customer_id) => customer_id,
        None => {
            let org = state
                .db
                .get_organization(req.org_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;
            let customer = state
                .stripe
                .create_customer(email, &org.name, req.org_id)
                .await?;
            state.db.set_stripe_customer(req.org_id, &customer.id).await?;
            customer.id
        }
    };

    let base = billing_url(&state.config.app_url, req.org_id);
    let session = state
        .stripe
        .create_checkout_session(
            &customer_id,
            &price_id,
            &format!("{}?success=true", base),
            &format!("{}?canceled=true", base),
            req.org_id,
        )
        .await?;

    let checkout_url = session.url.ok_or_else(|| {
        AppError::BadGateway("Checkout session has no redirect URL".to_string())
    })?;

    Ok(Json(ApiResponse::new(CheckoutResponse {
        checkout_url,
        session_id: session.id,
    })))
}

/// POST /api/billing/portal
#[instrument(skip(state, user, req), fields(org_id = %req.org_id))]
pub async fn create_portal(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PortalRequest>,
) -> Result<Json<ApiResponse<PortalResponse>>, AppError> {
    let member = require_member(&state.db, req.org_id, &user).await?;
    require_role(&member, &[Role::Owner])?;

    if !state.stripe.is_configured() {
        return Err(AppError::ServiceUnavailable(
            "Billing is not configured".to_string(),
        ));
    }

    let customer_id = load_subscription(&state, req.org_id)
        .await?
        .stripe_customer_id
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No billing customer found")))?;

    let session = state
        .stripe
        .create_portal_session(&customer_id, &billing_url(&state.config.app_url, req.org_id))
        .await?;

    Ok(Json(ApiResponse::new(PortalResponse {
        portal_url: session.url,
    })))
}

/// POST /api/billing/webhook
///
/// Signature is checked against the raw body before anything is parsed.
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let secret = state.stripe.config().webhook_secret.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("Billing webhooks are not configured".to_string())
    })?;

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            record_webhook("stripe", "rejected");
            AppError::BadRequest(anyhow::anyhow!("Missing Stripe-Signature header"))
        })?;

    verify_webhook_signature(&body, signature, secret.expose_secret(), Utc::now().timestamp())
        .map_err(|e| {
            record_webhook("stripe", "rejected");
            AppError::from(e)
        })?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid event payload: {}", e)))?;

    let action = event.action(state.stripe.config());
    let processed = state
        .db
        .process_billing_event(&event.id, &event.event_type, &event.data.object, &action)
        .await?;

    record_webhook("stripe", if processed { "processed" } else { "duplicate" });
    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        processed,
        "Stripe webhook handled"
    );

    Ok(Json(json!({ "received": true })))
}
