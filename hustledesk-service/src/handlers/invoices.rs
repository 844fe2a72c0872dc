//! Invoices, manual payments and STK push collection.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::dtos::sales::{
    CreateInvoiceRequest, InvoicePaymentResponse, InvoiceQuery, RecordPaymentRequest,
    StkPushRequest, StkPushResponse, StkStatusResponse,
};
use crate::dtos::{ApiResponse, ValidateRequest};
use crate::middleware::{require_manager, require_member, AuthUser};
use crate::models::{
    CreateInvoice, CreateInvoicePayment, CreatePendingStk, Invoice, InvoiceDetail, InvoiceRow,
    InvoiceSource, InvoiceStatus, ListInvoicesFilter,
};
use crate::services::metrics::{record_invoice_status, record_payment};
use crate::services::mpesa::StkPush;
use crate::utils::{
    calculate_total, format_for_mpesa, is_valid_mpesa_amount, line_total, today_eat,
};
use crate::AppState;
use service_core::error::AppError;

fn invoice_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice not found"))
}

/// GET /api/orgs/:org_id/invoices
///
/// Overdue invoices are flagged before the page is read.
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<ApiResponse<Vec<InvoiceRow>>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let page = query.pagination();
    let filter = ListInvoicesFilter {
        status: query.status,
        customer_id: query.customer,
        limit: page.limit(),
        offset: page.offset(),
    };
    let invoices = state
        .db
        .list_invoices(org_id, &filter, today_eat(Utc::now()))
        .await?;

    Ok(Json(ApiResponse::new(invoices)))
}

/// GET /api/orgs/:org_id/invoices/:invoice_id
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<InvoiceDetail>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let invoice = state
        .db
        .get_invoice_detail(org_id, invoice_id)
        .await?
        .ok_or_else(invoice_not_found)?;

    Ok(Json(ApiResponse::new(invoice)))
}

/// POST /api/orgs/:org_id/invoices
#[instrument(skip(state, user, req))]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), AppError> {
    require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    let source = match (req.order_id, req.items.is_empty()) {
        (Some(order_id), _) => InvoiceSource::Order(order_id),
        (None, false) => {
            let subtotal_cents = req
                .items
                .iter()
                .map(|i| line_total(i.unit_price_cents, i.quantity))
                .sum();
            InvoiceSource::Lines(calculate_total(subtotal_cents, 0, Decimal::ZERO))
        }
        (None, true) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Either order_id or items must be provided"
            )))
        }
    };

    if let Some(customer_id) = req.customer_id {
        if !state.db.customer_exists(org_id, customer_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!("Customer not found")));
        }
    }

    let invoice = state
        .db
        .create_invoice(&CreateInvoice {
            org_id,
            source,
            customer_id: req.customer_id,
            due_date: req.due_date,
            note: req.note.clone(),
            created_by: user.user_id().to_string(),
        })
        .await?;

    record_invoice_status(&invoice.status);
    Ok((StatusCode::CREATED, Json(ApiResponse::new(invoice))))
}

/// POST /api/orgs/:org_id/invoices/:invoice_id/payments
#[instrument(skip(state, user, req), fields(tender = req.tender.as_str()))]
pub async fn record_invoice_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoicePaymentResponse>>), AppError> {
    require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    let (invoice, payment) = state
        .db
        .record_invoice_payment(
            org_id,
            invoice_id,
            &CreateInvoicePayment {
                tender: req.tender,
                amount_cents: req.amount_cents,
                mpesa_ref: req.mpesa_ref.clone(),
                created_by: Some(user.user_id().to_string()),
            },
        )
        .await?;

    record_payment(req.tender.as_str());
    record_invoice_status(&invoice.status);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(InvoicePaymentResponse { invoice, payment })),
    ))
}

/// POST /api/orgs/:org_id/invoices/:invoice_id/cancel
#[instrument(skip(state, user))]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Invoice>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;

    let invoice = state
        .db
        .cancel_invoice(org_id, invoice_id, user.user_id())
        .await?;

    record_invoice_status(&invoice.status);
    Ok(Json(ApiResponse::new(invoice)))
}

fn stk_callback_url(app_url: &str, token: Option<&str>) -> String {
    let base = format!("{}/api/mpesa/stk/webhook", app_url.trim_end_matches('/'));
    match token {
        Some(token) => format!("{}?token={}", base, token),
        None => base,
    }
}

/// POST /api/orgs/:org_id/invoices/:invoice_id/stk
///
/// Prompts the customer's phone for the outstanding balance. The pending
/// transaction row remembers the invoice so the callback can settle it.
#[instrument(skip(state, user, req))]
pub async fn initiate_stk_push(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StkPushRequest>,
) -> Result<Json<ApiResponse<StkPushResponse>>, AppError> {
    require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    if !state.mpesa.is_configured() {
        return Err(AppError::ServiceUnavailable(
            "M-Pesa is not configured".to_string(),
        ));
    }

    let invoice = state
        .db
        .get_invoice(org_id, invoice_id)
        .await?
        .ok_or_else(invoice_not_found)?;

    match invoice.status() {
        InvoiceStatus::Paid => {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invoice is already paid")))
        }
        InvoiceStatus::Cancelled => {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invoice is cancelled")))
        }
        InvoiceStatus::Unpaid | InvoiceStatus::Overdue => {}
    }

    let amount_cents = invoice.outstanding_cents();
    if !is_valid_mpesa_amount(amount_cents) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Amount is outside the M-Pesa transaction limits"
        )));
    }
    let amount_kes = format_for_mpesa(amount_cents);

    let callback_url = stk_callback_url(&state.config.app_url, state.mpesa.callback_token());
    let description = format!("Invoice {}", invoice.number);

    let accepted = state
        .mpesa
        .stk_push(StkPush {
            phone: &req.phone,
            amount: amount_kes,
            account_reference: &invoice.number,
            description: &description,
            callback_url: &callback_url,
        })
        .await?;

    state
        .db
        .create_pending_stk(&CreatePendingStk {
            org_id,
            invoice_id,
            checkout_request_id: accepted.checkout_request_id.clone(),
            amount_cents,
            msisdn: accepted.msisdn.clone(),
            raw: accepted.raw.clone(),
        })
        .await?;

    Ok(Json(ApiResponse::new(StkPushResponse {
        checkout_request_id: accepted.checkout_request_id,
        merchant_request_id: accepted.merchant_request_id,
        customer_message: accepted.customer_message,
        amount_kes,
    })))
}

/// GET /api/orgs/:org_id/mpesa/stk/:checkout_request_id
pub async fn stk_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, checkout_request_id)): Path<(Uuid, String)>,
) -> Result<Json<ApiResponse<StkStatusResponse>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let transaction = state
        .db
        .get_stk_transaction(org_id, &checkout_request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("STK transaction not found")))?;

    let upstream = state.mpesa.stk_query(&checkout_request_id).await?;

    Ok(Json(ApiResponse::new(StkStatusResponse {
        transaction,
        result_code: upstream.result_code,
        result_desc: upstream.result_desc,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_carries_token_when_configured() {
        assert_eq!(
            stk_callback_url("https://app.example.com/", None),
            "https://app.example.com/api/mpesa/stk/webhook"
        );
        assert_eq!(
            stk_callback_url("https://app.example.com", Some("s3cret")),
            "https://app.example.com/api/mpesa/stk/webhook?token=s3cret"
        );
    }
}
