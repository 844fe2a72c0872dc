//! Point-of-sale order capture.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;
use uuid::Uuid;
use validator::ValidationErrors;

use super::ensure_outlet;
use crate::dtos::sales::{CreateOrderRequest, OrderQuery};
use crate::dtos::{add_error, ApiResponse, ValidateRequest};
use crate::middleware::{require_member, require_outlet_access, AuthUser};
use crate::models::{CreateOrder, OrderDetail};
use crate::services::database::ListOrdersFilter;
use crate::services::metrics::{record_order_created, record_payment};
use crate::services::pricing::{price_order, PricingError};
use crate::AppState;
use service_core::error::AppError;

fn unprocessable(field: &'static str, message: &str) -> AppError {
    let mut errors = ValidationErrors::new();
    add_error(&mut errors, field, message);
    AppError::ValidationError(errors)
}

/// GET /api/orgs/:org_id/orders
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<ApiResponse<Vec<OrderDetail>>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    if let Some(outlet_id) = query.outlet {
        require_outlet_access(&member, outlet_id)?;
    }

    let filter = ListOrdersFilter {
        from: query.from,
        to: query.to,
        outlet_id: query.outlet,
    };
    let orders = state
        .db
        .list_orders(org_id, &filter, &query.pagination())
        .await?;

    Ok(Json(ApiResponse::new(orders)))
}

/// POST /api/orgs/:org_id/orders
///
/// Prices the lines against the catalog, then writes the order, its items,
/// stock movements, payment and customer balance in one transaction.
#[instrument(skip(state, user, req), fields(items = req.items.len()))]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    if let Some(customer_id) = req.customer_id {
        if !state.db.customer_exists(org_id, customer_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!("Customer not found")));
        }
    }
    if let Some(outlet_id) = req.outlet_id {
        ensure_outlet(&state, &member, org_id, outlet_id).await?;
    }

    let mut product_ids: Vec<Uuid> = req.items.iter().filter_map(|i| i.product_id).collect();
    product_ids.sort();
    product_ids.dedup();
    let products = if product_ids.is_empty() {
        Vec::new()
    } else {
        state.db.products_by_ids(org_id, &product_ids).await?
    };

    let priced = price_order(&req.items, &products, req.discount_cents).map_err(|e| match e {
        PricingError::UnknownProduct(_) => AppError::NotFound(anyhow::anyhow!(e.to_string())),
        PricingError::DiscountExceedsSubtotal { .. } => {
            unprocessable("discount_cents", &e.to_string())
        }
    })?;

    let paid_cents = req.paid_amount_cents.unwrap_or(0);
    if paid_cents > priced.total_cents {
        return Err(unprocessable(
            "paid_amount_cents",
            "Paid amount cannot exceed the order total",
        ));
    }

    let input = CreateOrder {
        org_id,
        outlet_id: req.outlet_id,
        customer_id: req.customer_id,
        lines: priced.lines,
        subtotal_cents: priced.subtotal_cents,
        discount_cents: priced.discount_cents,
        tax_cents: priced.tax_cents,
        total_cents: priced.total_cents,
        paid_cents,
        tender: req.tender,
        note: req.note.clone(),
        created_by: user.user_id().to_string(),
    };

    let order = state.db.create_order(&input).await?;

    let currency = state
        .db
        .get_organization(org_id)
        .await?
        .map(|o| o.currency)
        .unwrap_or_else(|| "KES".to_string());
    record_order_created(input.total_cents, input.balance_cents(), &currency);
    if let Some(tender) = input.tender.filter(|_| paid_cents > 0) {
        record_payment(tender.as_str());
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::new(order))))
}
