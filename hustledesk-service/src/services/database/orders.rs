//! Point-of-sale orders.

use super::catalog::insert_movement;
use super::{bump_usage, db_error, Database};
use crate::models::{
    CreateMovement, CreateOrder, MovementType, OrderDetail, OrderItem, OrderRow, Product,
    UsageMetric, ORDER_STATUS_COMPLETED,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use service_core::utils::Pagination;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

const ORDER_ROW_SELECT: &str = r#"
    SELECT o.order_id, o.org_id, o.outlet_id, o.customer_id, o.status, o.subtotal_cents,
           o.discount_cents, o.tax_cents, o.total_cents, o.paid_cents, o.balance_cents,
           o.note, o.created_by, o.created_utc,
           c.name AS customer_name, c.phone AS customer_phone, ot.name AS outlet_name
    FROM orders o
    LEFT JOIN customers c ON c.customer_id = o.customer_id
    LEFT JOIN outlets ot ON ot.outlet_id = o.outlet_id
"#;

/// Filter for the order listing.
#[derive(Debug, Clone, Default)]
pub struct ListOrdersFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet_id: Option<Uuid>,
}

impl Database {
    /// Org products among `product_ids`; ids from other orgs are simply absent.
    #[instrument(skip(self, product_ids))]
    pub async fn products_by_ids(
        &self,
        org_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<Vec<Product>, AppError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, org_id, name, sku, price_cents, unit, tax_rate,
                   low_stock_threshold, created_utc, updated_utc
            FROM products
            WHERE org_id = $1 AND product_id = ANY($2)
            "#,
        )
        .bind(org_id)
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load products", e))
    }

    /// Persist an order with its items, stock movements, payment, customer
    /// balance and usage counter. Everything rolls back together.
    #[instrument(skip(self, input), fields(org_id = %input.org_id, total_cents = input.total_cents))]
    pub async fn create_order(&self, input: &CreateOrder) -> Result<OrderDetail, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_order"])
            .start_timer();

        let order_id = Uuid::new_v4();
        let balance_cents = input.balance_cents();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, org_id, outlet_id, customer_id, status, subtotal_cents,
                                discount_cents, tax_cents, total_cents, paid_cents, balance_cents,
                                note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order_id)
        .bind(input.org_id)
        .bind(input.outlet_id)
        .bind(input.customer_id)
        .bind(ORDER_STATUS_COMPLETED)
        .bind(input.subtotal_cents)
        .bind(input.discount_cents)
        .bind(input.tax_cents)
        .bind(input.total_cents)
        .bind(input.paid_cents)
        .bind(balance_cents)
        .bind(&input.note)
        .bind(&input.created_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create order", e))?;

        let mut items = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let item = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (order_item_id, org_id, order_id, product_id, name,
                                         unit_price_cents, quantity, tax_cents, total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING order_item_id, org_id, order_id, product_id, name, unit_price_cents,
                          quantity, tax_cents, total_cents, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(input.org_id)
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.tax_cents)
            .bind(line.total_cents)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to create order item", e))?;
            items.push(item);

            if let Some(product_id) = line.product_id {
                let movement = CreateMovement {
                    org_id: input.org_id,
                    product_id,
                    outlet_id: input.outlet_id,
                    movement_type: MovementType::Sale,
                    quantity: line.quantity,
                    note: Some(format!("Sale from order {}", order_id)),
                    created_by: input.created_by.clone(),
                };
                insert_movement(
                    &mut tx,
                    &movement,
                    MovementType::Sale.signed_quantity(line.quantity),
                )
                .await?;
            }
        }

        if let Some(tender) = input.tender.filter(|_| input.paid_cents > 0) {
            sqlx::query(
                r#"
                INSERT INTO payments (payment_id, org_id, order_id, tender, amount_cents, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(input.org_id)
            .bind(order_id)
            .bind(tender.as_str())
            .bind(input.paid_cents)
            .bind(&input.created_by)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to record order payment", e))?;
        }

        if let Some(customer_id) = input.customer_id {
            sqlx::query(
                r#"
                UPDATE customers
                SET balance_cents = balance_cents + $3, last_activity_utc = NOW()
                WHERE org_id = $1 AND customer_id = $2
                "#,
            )
            .bind(input.org_id)
            .bind(customer_id)
            .bind(balance_cents.max(0))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to update customer balance", e))?;
        }

        bump_usage(&mut tx, input.org_id, UsageMetric::Orders).await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "{ORDER_ROW_SELECT} WHERE o.org_id = $1 AND o.order_id = $2"
        ))
        .bind(input.org_id)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load created order", e))?;

        tx.commit().await?;

        timer.observe_duration();
        info!(
            order_id = %order_id,
            total_cents = input.total_cents,
            paid_cents = input.paid_cents,
            items = items.len(),
            "Order created"
        );

        Ok(OrderDetail { order: row, items })
    }

    /// Orders in the org, newest first, each with its items.
    #[instrument(skip(self, filter, page))]
    pub async fn list_orders(
        &self,
        org_id: Uuid,
        filter: &ListOrdersFilter,
        page: &Pagination,
    ) -> Result<Vec<OrderDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_orders"])
            .start_timer();

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"{ORDER_ROW_SELECT}
            WHERE o.org_id = $1
              AND ($2::timestamptz IS NULL OR o.created_utc >= $2)
              AND ($3::timestamptz IS NULL OR o.created_utc <= $3)
              AND ($4::uuid IS NULL OR o.outlet_id = $4)
            ORDER BY o.created_utc DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(org_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.outlet_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list orders", e))?;

        let order_ids: Vec<Uuid> = rows.iter().map(|r| r.order.order_id).collect();
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT order_item_id, org_id, order_id, product_id, name, unit_price_cents,
                   quantity, tax_cents, total_cents, created_utc
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY created_utc, order_item_id
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list order items", e))?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        timer.observe_duration();

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_order.remove(&row.order.order_id).unwrap_or_default();
                OrderDetail { order: row, items }
            })
            .collect())
    }
}
