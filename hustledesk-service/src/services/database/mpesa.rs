//! M-Pesa transaction log and webhook reconciliation.

use super::invoices::{
    apply_invoice_payment, lock_invoice, lock_open_invoices_by_number, mpesa_payment,
    mpesa_ref_recorded,
};
use super::{db_error, Database};
use crate::models::{
    C2bPayment, CreatePendingStk, InvoiceStatus, MpesaKind, MpesaStatus, MpesaTransaction,
    ReconcileOutcome, StkOutcome,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MPESA_COLUMNS: &str = "mpesa_transaction_id, org_id, kind, status, amount_cents, msisdn, \
    reference, raw, matched_invoice_id, provider, created_utc, updated_utc";

impl Database {
    /// Store the pending STK push so the callback can find its invoice.
    #[instrument(skip(self, input), fields(invoice_id = %input.invoice_id))]
    pub async fn create_pending_stk(
        &self,
        input: &CreatePendingStk,
    ) -> Result<MpesaTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_pending_stk"])
            .start_timer();

        let tx = sqlx::query_as::<_, MpesaTransaction>(&format!(
            r#"
            INSERT INTO mpesa_transactions (mpesa_transaction_id, org_id, kind, status, amount_cents,
                                            msisdn, reference, raw, matched_invoice_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MPESA_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.org_id)
        .bind(MpesaKind::Stk.as_str())
        .bind(MpesaStatus::Pending.as_str())
        .bind(input.amount_cents)
        .bind(&input.msisdn)
        .bind(&input.checkout_request_id)
        .bind(&input.raw)
        .bind(input.invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_sqlx(e, "Failed to store STK request", "STK request already recorded")
        })?;

        timer.observe_duration();
        Ok(tx)
    }

    pub async fn get_stk_transaction(
        &self,
        org_id: Uuid,
        checkout_request_id: &str,
    ) -> Result<Option<MpesaTransaction>, AppError> {
        sqlx::query_as::<_, MpesaTransaction>(&format!(
            r#"
            SELECT {MPESA_COLUMNS} FROM mpesa_transactions
            WHERE org_id = $1 AND kind = $2 AND reference = $3
            "#
        ))
        .bind(org_id)
        .bind(MpesaKind::Stk.as_str())
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get STK transaction", e))
    }

    /// Record a C2B confirmation and settle the invoice its reference names.
    ///
    /// Redelivered TransIDs are acknowledged without changes. The reference
    /// must identify exactly one open invoice; anything else stays unmatched.
    #[instrument(skip(self, payment), fields(trans_id = %payment.trans_id))]
    pub async fn reconcile_c2b(&self, payment: &C2bPayment) -> Result<ReconcileOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile_c2b"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let transaction_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO mpesa_transactions (mpesa_transaction_id, kind, status, amount_cents,
                                            msisdn, reference, raw)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (kind, reference) WHERE reference IS NOT NULL DO NOTHING
            RETURNING mpesa_transaction_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(MpesaKind::C2b.as_str())
        .bind(MpesaStatus::Success.as_str())
        .bind(payment.amount_cents)
        .bind(&payment.msisdn)
        .bind(&payment.trans_id)
        .bind(&payment.raw)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to record C2B transaction", e))?;

        let Some(transaction_id) = transaction_id else {
            info!(trans_id = %payment.trans_id, "Duplicate C2B confirmation ignored");
            return Ok(ReconcileOutcome::Duplicate);
        };

        let Some(reference) = payment.bill_reference.as_deref() else {
            tx.commit().await?;
            warn!(trans_id = %payment.trans_id, "C2B payment without account reference");
            return Ok(ReconcileOutcome::Unmatched);
        };

        let candidates = lock_open_invoices_by_number(&mut tx, reference).await?;
        let [invoice] = candidates.as_slice() else {
            tx.commit().await?;
            warn!(
                trans_id = %payment.trans_id,
                reference = %reference,
                candidates = candidates.len(),
                "C2B payment did not match a single open invoice"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        if mpesa_ref_recorded(&mut tx, &payment.trans_id).await? {
            tx.commit().await?;
            warn!(
                trans_id = %payment.trans_id,
                invoice_id = %invoice.invoice_id,
                "C2B receipt already recorded as a payment"
            );
            return Ok(ReconcileOutcome::Unmatched);
        }

        let (_, settlement) = apply_invoice_payment(
            &mut tx,
            invoice,
            &mpesa_payment(payment.amount_cents, Some(payment.trans_id.clone())),
        )
        .await?;

        link_invoice(&mut tx, transaction_id, invoice.org_id, invoice.invoice_id).await?;
        tx.commit().await?;

        timer.observe_duration();
        info!(
            trans_id = %payment.trans_id,
            invoice_id = %invoice.invoice_id,
            status = settlement.status.as_str(),
            "C2B payment reconciled"
        );

        Ok(ReconcileOutcome::Applied {
            invoice_id: invoice.invoice_id,
            status: settlement.status,
        })
    }

    /// Settle an STK push from its callback via the pending row stored at push time.
    #[instrument(skip(self, outcome), fields(checkout_request_id = %outcome.checkout_request_id, success = outcome.success))]
    pub async fn reconcile_stk(&self, outcome: &StkOutcome) -> Result<ReconcileOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile_stk"])
            .start_timer();

        let status = if outcome.success {
            MpesaStatus::Success
        } else {
            MpesaStatus::Failed
        };

        let mut tx = self.pool.begin().await?;

        let pending = sqlx::query_as::<_, MpesaTransaction>(&format!(
            r#"
            SELECT {MPESA_COLUMNS} FROM mpesa_transactions
            WHERE kind = $1 AND reference = $2
            FOR UPDATE
            "#
        ))
        .bind(MpesaKind::Stk.as_str())
        .bind(&outcome.checkout_request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to load STK transaction", e))?;

        let Some(pending) = pending else {
            sqlx::query(
                r#"
                INSERT INTO mpesa_transactions (mpesa_transaction_id, kind, status, amount_cents,
                                                msisdn, reference, raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (kind, reference) WHERE reference IS NOT NULL DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(MpesaKind::Stk.as_str())
            .bind(status.as_str())
            .bind(outcome.amount_cents)
            .bind(&outcome.msisdn)
            .bind(&outcome.checkout_request_id)
            .bind(&outcome.raw)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to record STK transaction", e))?;
            tx.commit().await?;

            warn!(checkout_request_id = %outcome.checkout_request_id, "STK callback without pending request");
            return Ok(ReconcileOutcome::Unmatched);
        };

        if pending.status() != MpesaStatus::Pending {
            info!(checkout_request_id = %outcome.checkout_request_id, "STK callback already processed");
            return Ok(ReconcileOutcome::Duplicate);
        }

        sqlx::query(
            r#"
            UPDATE mpesa_transactions
            SET status = $2,
                amount_cents = COALESCE($3, amount_cents),
                msisdn = COALESCE($4, msisdn),
                raw = $5,
                updated_utc = NOW()
            WHERE mpesa_transaction_id = $1
            "#,
        )
        .bind(pending.mpesa_transaction_id)
        .bind(status.as_str())
        .bind(outcome.amount_cents)
        .bind(&outcome.msisdn)
        .bind(&outcome.raw)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to update STK transaction", e))?;

        if !outcome.success {
            tx.commit().await?;
            info!(checkout_request_id = %outcome.checkout_request_id, "STK push failed");
            return Ok(ReconcileOutcome::Failed);
        }

        let (Some(org_id), Some(invoice_id)) = (pending.org_id, pending.matched_invoice_id) else {
            tx.commit().await?;
            return Ok(ReconcileOutcome::Unmatched);
        };

        let invoice = lock_invoice(&mut tx, org_id, invoice_id).await?;
        let Some(invoice) = invoice.filter(|i| i.status() != InvoiceStatus::Cancelled) else {
            tx.commit().await?;
            warn!(invoice_id = %invoice_id, "STK payment for missing or cancelled invoice");
            return Ok(ReconcileOutcome::Unmatched);
        };

        let amount_cents = outcome
            .amount_cents
            .or(pending.amount_cents)
            .unwrap_or_else(|| invoice.outstanding_cents());

        if let Some(receipt) = outcome.receipt_number.as_deref() {
            if mpesa_ref_recorded(&mut tx, receipt).await? {
                unlink_invoice(&mut tx, pending.mpesa_transaction_id).await?;
                tx.commit().await?;
                warn!(
                    receipt = %receipt,
                    invoice_id = %invoice_id,
                    "STK receipt already recorded as a payment"
                );
                return Ok(ReconcileOutcome::Unmatched);
            }
        }

        let (_, settlement) = apply_invoice_payment(
            &mut tx,
            &invoice,
            &mpesa_payment(amount_cents, outcome.receipt_number.clone()),
        )
        .await?;

        tx.commit().await?;

        timer.observe_duration();
        info!(
            invoice_id = %invoice_id,
            amount_cents = amount_cents,
            status = settlement.status.as_str(),
            "STK payment reconciled"
        );

        Ok(ReconcileOutcome::Applied {
            invoice_id,
            status: settlement.status,
        })
    }
}

async fn link_invoice(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    org_id: Uuid,
    invoice_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE mpesa_transactions
        SET org_id = $2, matched_invoice_id = $3, updated_utc = NOW()
        WHERE mpesa_transaction_id = $1
        "#,
    )
    .bind(transaction_id)
    .bind(org_id)
    .bind(invoice_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to link M-Pesa transaction", e))?;

    Ok(())
}

async fn unlink_invoice(conn: &mut PgConnection, transaction_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE mpesa_transactions
        SET matched_invoice_id = NULL, updated_utc = NOW()
        WHERE mpesa_transaction_id = $1
        "#,
    )
    .bind(transaction_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to unlink M-Pesa transaction", e))?;

    Ok(())
}
