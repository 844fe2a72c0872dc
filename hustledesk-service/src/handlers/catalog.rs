//! Customers, products and stock.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use tracing::instrument;
use uuid::Uuid;

use super::ensure_outlet;
use crate::dtos::catalog::{
    CreateCustomerRequest, CreateProductRequest, CustomerQuery, InventoryMovementRequest,
    ProductQuery, StockLevelResponse, UpdateProductRequest,
};
use crate::dtos::{ApiResponse, ValidateRequest};
use crate::middleware::{require_manager, require_member, AuthUser};
use crate::models::{CreateMovement, Customer, Product, ProductWithStock};
use crate::AppState;
use service_core::error::AppError;

fn product_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Product not found"))
}

/// GET /api/orgs/:org_id/customers
pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<ApiResponse<Vec<Customer>>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let search = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let customers = state
        .db
        .list_customers(org_id, search, &query.pagination())
        .await?;

    Ok(Json(ApiResponse::new(customers)))
}

/// POST /api/orgs/:org_id/customers
pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Customer>>), AppError> {
    require_member(&state.db, org_id, &user).await?;
    req.validated()?;

    let customer = state.db.create_customer(org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(customer))))
}

/// GET /api/orgs/:org_id/products
pub async fn list_products(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductWithStock>>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let search = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let products = state
        .db
        .list_products(
            org_id,
            search,
            query.low_stock.unwrap_or(false),
            &query.pagination(),
        )
        .await?;

    Ok(Json(ApiResponse::new(products)))
}

/// POST /api/orgs/:org_id/products
#[instrument(skip(state, user, req), fields(product = %req.name))]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;
    req.validated()?;

    let product = state.db.create_product(org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(product))))
}

/// GET /api/orgs/:org_id/products/:product_id
pub async fn get_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ProductWithStock>>, AppError> {
    require_member(&state.db, org_id, &user).await?;

    let product = state
        .db
        .get_product(org_id, product_id)
        .await?
        .ok_or_else(product_not_found)?;

    Ok(Json(ApiResponse::new(product)))
}

/// PATCH /api/orgs/:org_id/products/:product_id
#[instrument(skip(state, user, req))]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<Product>>, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;
    req.validated()?;

    let product = state
        .db
        .update_product(org_id, product_id, &req, user.user_id())
        .await?
        .ok_or_else(product_not_found)?;

    Ok(Json(ApiResponse::new(product)))
}

/// DELETE /api/orgs/:org_id/products/:product_id
#[instrument(skip(state, user))]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;

    if state
        .db
        .delete_product(org_id, product_id, user.user_id())
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(product_not_found())
    }
}

/// POST /api/orgs/:org_id/products/:product_id/inventory
#[instrument(skip(state, user, req), fields(movement_type = req.movement_type.as_str()))]
pub async fn record_inventory_movement(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, product_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<InventoryMovementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StockLevelResponse>>), AppError> {
    let member = require_member(&state.db, org_id, &user).await?;
    require_manager(&member)?;
    req.validated()?;

    if let Some(outlet_id) = req.outlet_id {
        ensure_outlet(&state, &member, org_id, outlet_id).await?;
    }

    let movement = CreateMovement {
        org_id,
        product_id,
        outlet_id: req.outlet_id,
        movement_type: req.movement_type,
        quantity: req.quantity,
        note: req.note.clone(),
        created_by: user.user_id().to_string(),
    };

    let stock_quantity = state
        .db
        .record_movement(&movement)
        .await?
        .ok_or_else(product_not_found)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StockLevelResponse {
            product_id,
            stock_quantity,
        })),
    ))
}
