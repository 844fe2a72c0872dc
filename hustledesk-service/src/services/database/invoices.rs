//! Invoices, their numbering and payment application.

use super::{bump_usage, db_error, record_audit, Database};
use crate::models::{
    next_invoice_number, AuditEntry, CreateInvoice, CreateInvoicePayment, Invoice, InvoiceDetail,
    InvoiceRow, InvoiceSource, InvoiceStatus, ListInvoicesFilter, Payment, Settlement, Tender,
    UsageMetric,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, org_id, order_id, customer_id, number, due_date, \
    subtotal_cents, tax_cents, total_cents, paid_cents, status, note, created_by, created_utc";

const INVOICE_ROW_SELECT: &str = r#"
    SELECT i.invoice_id, i.org_id, i.order_id, i.customer_id, i.number, i.due_date,
           i.subtotal_cents, i.tax_cents, i.total_cents, i.paid_cents, i.status, i.note,
           i.created_by, i.created_utc,
           c.name AS customer_name, c.phone AS customer_phone, o.created_utc AS order_created_utc
    FROM invoices i
    LEFT JOIN customers c ON c.customer_id = i.customer_id
    LEFT JOIN orders o ON o.order_id = i.order_id
"#;

impl Database {
    /// Flip UNPAID invoices past their due date to OVERDUE.
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, org_id: Uuid, today: NaiveDate) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3
            WHERE org_id = $1 AND status = $4 AND due_date IS NOT NULL AND due_date < $2
            "#,
        )
        .bind(org_id)
        .bind(today)
        .bind(InvoiceStatus::Overdue.as_str())
        .bind(InvoiceStatus::Unpaid.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark overdue invoices", e))?;

        Ok(result.rows_affected())
    }

    /// Invoices newest first, after refreshing overdue status.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &ListInvoicesFilter,
        today: NaiveDate,
    ) -> Result<Vec<InvoiceRow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let flipped = self.mark_overdue(org_id, today).await?;
        if flipped > 0 {
            info!(org_id = %org_id, count = flipped, "Invoices marked overdue");
        }

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"{INVOICE_ROW_SELECT}
            WHERE i.org_id = $1
              AND ($2::text IS NULL OR i.status = $2)
              AND ($3::uuid IS NULL OR i.customer_id = $3)
            ORDER BY i.created_utc DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(org_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list invoices", e))?;

        timer.observe_duration();
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE org_id = $1 AND invoice_id = $2"
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get invoice", e))
    }

    /// Invoice with customer summary and its payments, oldest payment first.
    #[instrument(skip(self))]
    pub async fn get_invoice_detail(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_detail"])
            .start_timer();

        let Some(invoice) = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{INVOICE_ROW_SELECT} WHERE i.org_id = $1 AND i.invoice_id = $2"
        ))
        .bind(org_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get invoice", e))?
        else {
            return Ok(None);
        };

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, org_id, invoice_id, order_id, tender, amount_cents, mpesa_ref,
                   created_by, created_utc
            FROM payments
            WHERE org_id = $1 AND invoice_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(org_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list invoice payments", e))?;

        timer.observe_duration();
        Ok(Some(InvoiceDetail { invoice, payments }))
    }

    /// Number and insert an invoice. The org row lock serializes numbering.
    #[instrument(skip(self, input), fields(org_id = %input.org_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT org_id FROM organizations WHERE org_id = $1 FOR UPDATE")
            .bind(input.org_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to lock organization", e))?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;

        let (order_id, customer_id, subtotal_cents, tax_cents, total_cents) = match input.source {
            InvoiceSource::Order(order_id) => {
                // The invoice subtotal is net of the order discount so that
                // subtotal + tax still equals the copied total.
                let order: Option<(Option<Uuid>, i64, i64, i64)> = sqlx::query_as(
                    r#"
                    SELECT customer_id, subtotal_cents - discount_cents, tax_cents, total_cents
                    FROM orders
                    WHERE org_id = $1 AND order_id = $2
                    "#,
                )
                .bind(input.org_id)
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to load order", e))?;

                let (order_customer, subtotal, tax, total) = order
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;
                (
                    Some(order_id),
                    input.customer_id.or(order_customer),
                    subtotal,
                    tax,
                    total,
                )
            }
            InvoiceSource::Lines(totals) => (
                None,
                input.customer_id,
                totals.after_discount_cents,
                totals.tax_cents,
                totals.total_cents,
            ),
        };

        let last_number: Option<String> = sqlx::query_scalar(
            r#"
            SELECT number FROM invoices
            WHERE org_id = $1
            ORDER BY NULLIF(regexp_replace(number, '[^0-9]', '', 'g'), '')::numeric DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(input.org_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to read last invoice number", e))?;

        let number = next_invoice_number(last_number.as_deref());

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, org_id, order_id, customer_id, number, due_date,
                                  subtotal_cents, tax_cents, total_cents, paid_cents, status,
                                  note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.org_id)
        .bind(order_id)
        .bind(customer_id)
        .bind(&number)
        .bind(input.due_date)
        .bind(subtotal_cents)
        .bind(tax_cents)
        .bind(total_cents)
        .bind(InvoiceStatus::Unpaid.as_str())
        .bind(&input.note)
        .bind(&input.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_sqlx(e, "Failed to create invoice", "Invoice number already exists")
        })?;

        bump_usage(&mut tx, input.org_id, UsageMetric::Invoices).await?;
        tx.commit().await?;

        timer.observe_duration();
        info!(invoice_id = %invoice.invoice_id, number = %invoice.number, total_cents = total_cents, "Invoice created");

        Ok(invoice)
    }

    /// Record a manual payment against an open invoice.
    #[instrument(skip(self, payment), fields(amount_cents = payment.amount_cents))]
    pub async fn record_invoice_payment(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        payment: &CreateInvoicePayment,
    ) -> Result<(Invoice, Payment), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_invoice_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, org_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if !invoice.status().is_open() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice is {} and cannot accept payments",
                invoice.status
            )));
        }

        let (recorded, _) = apply_invoice_payment(&mut tx, &invoice, payment).await?;
        let updated = lock_invoice(&mut tx, org_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        tx.commit().await?;
        timer.observe_duration();

        Ok((updated, recorded))
    }

    /// Cancel an invoice that has not received any payment.
    #[instrument(skip(self))]
    pub async fn cancel_invoice(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        user_id: &str,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.pool.begin().await?;

        let invoice = lock_invoice(&mut tx, org_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if invoice.paid_cents > 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoices with payments cannot be cancelled"
            )));
        }
        if invoice.status() == InvoiceStatus::Cancelled {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invoice is already cancelled")));
        }

        let cancelled = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices SET status = $3
            WHERE org_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(org_id)
        .bind(invoice_id)
        .bind(InvoiceStatus::Cancelled.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to cancel invoice", e))?;

        record_audit(
            &mut tx,
            &AuditEntry {
                org_id,
                user_id: user_id.to_string(),
                action: "invoice.cancelled",
                entity: "invoice",
                entity_id: invoice_id,
                diff: Some(serde_json::json!({
                    "number": cancelled.number,
                    "previous_status": invoice.status,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        info!(invoice_id = %invoice_id, number = %cancelled.number, "Invoice cancelled");

        Ok(cancelled)
    }
}

pub(super) async fn lock_invoice(
    conn: &mut PgConnection,
    org_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE org_id = $1 AND invoice_id = $2 FOR UPDATE"
    ))
    .bind(org_id)
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to lock invoice", e))
}

/// Open invoices across all orgs carrying `number`, locked.
pub(super) async fn lock_open_invoices_by_number(
    conn: &mut PgConnection,
    number: &str,
) -> Result<Vec<Invoice>, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS} FROM invoices
        WHERE number = $1 AND status IN ($2, $3)
        FOR UPDATE
        "#
    ))
    .bind(number)
    .bind(InvoiceStatus::Unpaid.as_str())
    .bind(InvoiceStatus::Overdue.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to match invoice", e))
}

/// Whether a payment already carries this M-Pesa receipt.
pub(super) async fn mpesa_ref_recorded(
    conn: &mut PgConnection,
    mpesa_ref: &str,
) -> Result<bool, AppError> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payments WHERE mpesa_ref = $1)")
        .bind(mpesa_ref)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to check payment reference", e))
}

/// Insert a payment for a locked invoice and advance its paid amount and status.
///
/// Shared by manual payments and both M-Pesa reconciliations.
pub(super) async fn apply_invoice_payment(
    conn: &mut PgConnection,
    invoice: &Invoice,
    payment: &CreateInvoicePayment,
) -> Result<(Payment, Settlement), AppError> {
    let recorded = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (payment_id, org_id, invoice_id, tender, amount_cents, mpesa_ref, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING payment_id, org_id, invoice_id, order_id, tender, amount_cents, mpesa_ref,
                  created_by, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice.org_id)
    .bind(invoice.invoice_id)
    .bind(payment.tender.as_str())
    .bind(payment.amount_cents)
    .bind(&payment.mpesa_ref)
    .bind(&payment.created_by)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        AppError::from_sqlx(e, "Failed to record payment", "Payment reference already recorded")
    })?;

    let settlement = invoice.apply_payment(payment.amount_cents);

    sqlx::query("UPDATE invoices SET paid_cents = $2, status = $3 WHERE invoice_id = $1")
        .bind(invoice.invoice_id)
        .bind(settlement.paid_cents)
        .bind(settlement.status.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to update invoice", e))?;

    info!(
        invoice_id = %invoice.invoice_id,
        tender = payment.tender.as_str(),
        amount_cents = payment.amount_cents,
        status = settlement.status.as_str(),
        "Payment applied"
    );

    Ok((recorded, settlement))
}

/// Convenience for webhook reconciliation: an M-Pesa payment keyed by its receipt.
pub(super) fn mpesa_payment(amount_cents: i64, receipt: Option<String>) -> CreateInvoicePayment {
    CreateInvoicePayment {
        tender: Tender::Mpesa,
        amount_cents,
        mpesa_ref: receipt,
        created_by: None,
    }
}
