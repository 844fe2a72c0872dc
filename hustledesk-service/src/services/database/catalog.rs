//! Customers, products and stock movements.

use super::{bump_usage, db_error, like_pattern, record_audit, Database};
use crate::dtos::catalog::{CreateCustomerRequest, CreateProductRequest, UpdateProductRequest};
use crate::models::{
    AuditEntry, CreateMovement, Customer, Product, ProductWithStock, UsageMetric, DEFAULT_UNIT,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use service_core::error::AppError;
use service_core::utils::Pagination;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "p.product_id, p.org_id, p.name, p.sku, p.price_cents, p.unit, \
    p.tax_rate, p.low_stock_threshold, p.created_utc, p.updated_utc";

impl Database {
    // =========================================================================
    // Customers
    // =========================================================================

    /// Customers matching `query` on name, phone or email, newest first.
    #[instrument(skip(self, page))]
    pub async fn list_customers(
        &self,
        org_id: Uuid,
        query: Option<&str>,
        page: &Pagination,
    ) -> Result<Vec<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let pattern = query.map(str::trim).filter(|q| !q.is_empty()).map(like_pattern);

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, org_id, name, phone, email, tags, notes, balance_cents,
                   last_activity_utc, created_utc
            FROM customers
            WHERE org_id = $1
              AND ($2::text IS NULL OR name ILIKE $2 OR phone ILIKE $2 OR email ILIKE $2)
            ORDER BY created_utc DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(org_id)
        .bind(pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list customers", e))?;

        timer.observe_duration();
        Ok(customers)
    }

    #[instrument(skip(self, input))]
    pub async fn create_customer(
        &self,
        org_id: Uuid,
        input: &CreateCustomerRequest,
    ) -> Result<Customer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (customer_id, org_id, name, phone, email, tags, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING customer_id, org_id, name, phone, email, tags, notes, balance_cents,
                      last_activity_utc, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(input.name.trim())
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.tags)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create customer", e))?;

        timer.observe_duration();
        info!(org_id = %org_id, customer_id = %customer.customer_id, "Customer created");

        Ok(customer)
    }

    pub async fn customer_exists(&self, org_id: Uuid, customer_id: Uuid) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM customers WHERE org_id = $1 AND customer_id = $2)",
        )
        .bind(org_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check customer", e))
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Products with on-hand stock, newest first.
    #[instrument(skip(self, page))]
    pub async fn list_products(
        &self,
        org_id: Uuid,
        query: Option<&str>,
        low_stock_only: bool,
        page: &Pagination,
    ) -> Result<Vec<ProductWithStock>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_products"])
            .start_timer();

        let pattern = query.map(str::trim).filter(|q| !q.is_empty()).map(like_pattern);

        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {PRODUCT_COLUMNS},
                       COALESCE((SELECT SUM(m.quantity) FROM inventory_movements m
                                 WHERE m.product_id = p.product_id), 0) AS stock_quantity
                FROM products p
                WHERE p.org_id = $1
                  AND ($2::text IS NULL OR p.name ILIKE $2 OR p.sku ILIKE $2)
            ) s
            WHERE ($3 = FALSE OR s.stock_quantity <= s.low_stock_threshold)
            ORDER BY s.created_utc DESC
            LIMIT $4 OFFSET $5
            "#
        );

        let products = sqlx::query_as::<_, ProductWithStock>(&sql)
            .bind(org_id)
            .bind(pattern)
            .bind(low_stock_only)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list products", e))?;

        timer.observe_duration();
        Ok(products)
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        org_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductWithStock>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS},
                   COALESCE((SELECT SUM(m.quantity) FROM inventory_movements m
                             WHERE m.product_id = p.product_id), 0) AS stock_quantity
            FROM products p
            WHERE p.org_id = $1 AND p.product_id = $2
            "#
        );

        let product = sqlx::query_as::<_, ProductWithStock>(&sql)
            .bind(org_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get product", e))?;

        timer.observe_duration();
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        org_id: Uuid,
        input: &CreateProductRequest,
    ) -> Result<Product, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_product"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (product_id, org_id, name, sku, price_cents, unit, tax_rate, low_stock_threshold)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING product_id, org_id, name, sku, price_cents, unit, tax_rate,
                      low_stock_threshold, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(input.name.trim())
        .bind(&input.sku)
        .bind(input.price_cents)
        .bind(input.unit.as_deref().unwrap_or(DEFAULT_UNIT))
        .bind(input.tax_rate.unwrap_or(Decimal::ZERO))
        .bind(input.low_stock_threshold.unwrap_or(0))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create product", e))?;

        bump_usage(&mut tx, org_id, UsageMetric::Products).await?;
        tx.commit().await?;

        timer.observe_duration();
        info!(org_id = %org_id, product_id = %product.product_id, "Product created");

        Ok(product)
    }

    /// Apply a partial update and audit the changed fields.
    ///
    /// Returns `None` when the product is not in the org.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        org_id: Uuid,
        product_id: Uuid,
        input: &UpdateProductRequest,
        user_id: &str,
    ) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_product"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, org_id, name, sku, price_cents, unit, tax_rate,
                   low_stock_threshold, created_utc, updated_utc
            FROM products
            WHERE org_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(org_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load product", e))?
        else {
            return Ok(None);
        };

        let diff = product_diff(&current, input);

        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = $3, sku = $4, price_cents = $5, unit = $6, tax_rate = $7,
                low_stock_threshold = $8, updated_utc = NOW()
            WHERE org_id = $1 AND product_id = $2
            RETURNING product_id, org_id, name, sku, price_cents, unit, tax_rate,
                      low_stock_threshold, created_utc, updated_utc
            "#,
        )
        .bind(org_id)
        .bind(product_id)
        .bind(input.name.as_deref().map(str::trim).unwrap_or(&current.name))
        .bind(input.sku.as_ref().or(current.sku.as_ref()))
        .bind(input.price_cents.unwrap_or(current.price_cents))
        .bind(input.unit.as_deref().unwrap_or(&current.unit))
        .bind(input.tax_rate.unwrap_or(current.tax_rate))
        .bind(input.low_stock_threshold.unwrap_or(current.low_stock_threshold))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update product", e))?;

        record_audit(
            &mut tx,
            &AuditEntry {
                org_id,
                user_id: user_id.to_string(),
                action: "product.updated",
                entity: "product",
                entity_id: product_id,
                diff: Some(diff),
            },
        )
        .await?;

        tx.commit().await?;
        timer.observe_duration();

        Ok(Some(updated))
    }

    /// Delete a product; `false` when it was not in the org.
    #[instrument(skip(self))]
    pub async fn delete_product(
        &self,
        org_id: Uuid,
        product_id: Uuid,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<String> = sqlx::query_scalar(
            "DELETE FROM products WHERE org_id = $1 AND product_id = $2 RETURNING name",
        )
        .bind(org_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to delete product", e))?;

        let Some(name) = deleted else {
            return Ok(false);
        };

        record_audit(
            &mut tx,
            &AuditEntry {
                org_id,
                user_id: user_id.to_string(),
                action: "product.deleted",
                entity: "product",
                entity_id: product_id,
                diff: Some(json!({ "name": name })),
            },
        )
        .await?;

        tx.commit().await?;
        info!(org_id = %org_id, product_id = %product_id, "Product deleted");

        Ok(true)
    }

    /// Record a manual stock movement and return the resulting stock level.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn record_movement(&self, input: &CreateMovement) -> Result<Option<Decimal>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_movement"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar(
            "SELECT product_id FROM products WHERE org_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(input.org_id)
        .bind(input.product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load product", e))?;

        if exists.is_none() {
            return Ok(None);
        }

        insert_movement(
            &mut tx,
            input,
            input.movement_type.signed_quantity(input.quantity),
        )
        .await?;

        let stock: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_movements WHERE product_id = $1",
        )
        .bind(input.product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to compute stock", e))?;

        tx.commit().await?;
        timer.observe_duration();

        info!(
            product_id = %input.product_id,
            movement_type = input.movement_type.as_str(),
            stock = %stock,
            "Stock movement recorded"
        );

        Ok(Some(stock))
    }
}

pub(super) async fn insert_movement(
    conn: &mut PgConnection,
    input: &CreateMovement,
    signed_quantity: Decimal,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (movement_id, org_id, product_id, outlet_id, movement_type, quantity, note, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.org_id)
    .bind(input.product_id)
    .bind(input.outlet_id)
    .bind(input.movement_type.as_str())
    .bind(signed_quantity)
    .bind(&input.note)
    .bind(&input.created_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to record stock movement", e))?;

    Ok(())
}

/// Old and new values for each field the update actually changes.
fn product_diff(current: &Product, input: &UpdateProductRequest) -> Value {
    let mut diff = Map::new();
    let mut changed = |field: &str, old: Value, new: Value| {
        if old != new {
            diff.insert(field.to_string(), json!({ "old": old, "new": new }));
        }
    };

    if let Some(name) = &input.name {
        changed("name", json!(current.name), json!(name.trim()));
    }
    if let Some(sku) = &input.sku {
        changed("sku", json!(current.sku), json!(sku));
    }
    if let Some(price) = input.price_cents {
        changed("price_cents", json!(current.price_cents), json!(price));
    }
    if let Some(unit) = &input.unit {
        changed("unit", json!(current.unit), json!(unit));
    }
    if let Some(rate) = input.tax_rate {
        changed("tax_rate", json!(current.tax_rate.to_string()), json!(rate.to_string()));
    }
    if let Some(threshold) = input.low_stock_threshold {
        changed(
            "low_stock_threshold",
            json!(current.low_stock_threshold),
            json!(threshold),
        );
    }

    Value::Object(diff)
}
