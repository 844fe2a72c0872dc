//! Public Daraja callbacks. Both always answer with the Daraja ack body once
//! the payload is understood, so Safaricom stops retrying.

use axum::extract::{Json, Query, State};
use tracing::instrument;

use crate::dtos::mpesa::{C2bCallback, CallbackQuery, StkCallbackEnvelope, WebhookAck};
use crate::models::{C2bPayment, ReconcileOutcome, StkOutcome};
use crate::services::metrics::{record_invoice_status, record_payment, record_webhook};
use crate::utils::{cents_from_shillings, normalize_msisdn};
use crate::AppState;
use service_core::error::AppError;
use service_core::utils::constant_time_eq;

fn check_callback_token(state: &AppState, query: &CallbackQuery) -> Result<(), AppError> {
    let Some(expected) = state.mpesa.callback_token() else {
        return Ok(());
    };
    let valid = query
        .token
        .as_deref()
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()));
    if valid {
        Ok(())
    } else {
        tracing::warn!("M-Pesa callback with invalid token");
        Err(AppError::Unauthorized(anyhow::anyhow!("Invalid callback token")))
    }
}

fn record_outcome(source: &str, outcome: &ReconcileOutcome) {
    record_webhook(source, outcome.label());
    if let ReconcileOutcome::Applied { status, .. } = outcome {
        record_payment("MPESA");
        record_invoice_status(status.as_str());
    }
}

/// POST /api/mpesa/c2b/webhook
#[instrument(skip_all)]
pub async fn c2b_webhook(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<WebhookAck>, AppError> {
    check_callback_token(&state, &query)?;

    let callback: C2bCallback = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid C2B payload: {}", e)))?;

    let amount_cents = cents_from_shillings(callback.trans_amount);
    if amount_cents <= 0 {
        tracing::warn!(trans_id = %callback.trans_id, "C2B callback without a positive amount");
        record_webhook("mpesa_c2b", "ignored");
        return Ok(Json(WebhookAck::accepted()));
    }

    let payment = C2bPayment {
        trans_id: callback.trans_id.clone(),
        amount_cents,
        msisdn: callback
            .msisdn
            .as_deref()
            .map(|m| normalize_msisdn(m).unwrap_or_else(|| m.to_string())),
        bill_reference: callback.account_reference().map(str::to_string),
        raw,
    };

    let outcome = state.db.reconcile_c2b(&payment).await?;
    record_outcome("mpesa_c2b", &outcome);
    tracing::info!(
        trans_id = %payment.trans_id,
        amount_cents,
        outcome = outcome.label(),
        "C2B callback handled"
    );

    Ok(Json(WebhookAck::accepted()))
}

/// POST /api/mpesa/stk/webhook
#[instrument(skip_all)]
pub async fn stk_webhook(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<WebhookAck>, AppError> {
    check_callback_token(&state, &query)?;

    let envelope: StkCallbackEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid STK payload: {}", e)))?;
    let callback = envelope
        .body
        .map(|b| b.stk_callback)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing Body.stkCallback")))?;

    let success = callback.succeeded();
    let meta = callback.metadata();
    let outcome = StkOutcome {
        checkout_request_id: callback.checkout_request_id.clone(),
        success,
        amount_cents: meta.amount.map(cents_from_shillings).filter(|c| *c > 0),
        receipt_number: meta.receipt_number,
        msisdn: meta.phone_number,
        raw,
    };

    let result = state.db.reconcile_stk(&outcome).await?;
    record_outcome("mpesa_stk", &result);
    tracing::info!(
        checkout_request_id = %outcome.checkout_request_id,
        success,
        result_desc = ?callback.result_desc,
        outcome = result.label(),
        "STK callback handled"
    );

    Ok(Json(WebhookAck::accepted()))
}
