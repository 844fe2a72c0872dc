//! SaaS subscription state, Stripe event log and usage counters.

use super::{db_error, Database};
use crate::models::{
    BillingEventAction, BillingStatus, Plan, Subscription, SubscriptionSync, UpsertBillingInvoice,
    UsageRecord, UsageSummary, SUBSCRIPTION_ACTIVE, SUBSCRIPTION_INACTIVE,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, org_id, plan, status, billing_status, \
    stripe_customer_id, stripe_subscription_id, current_period_start, current_period_end, \
    trial_end, cancel_at_period_end, canceled_utc, created_utc, updated_utc";

impl Database {
    #[instrument(skip(self))]
    pub async fn get_subscription(&self, org_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE org_id = $1"
        ))
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get subscription", e))?;

        timer.observe_duration();
        Ok(subscription)
    }

    /// Plan in force for an org; orgs without a subscription row are FREE.
    pub async fn current_plan(&self, org_id: Uuid) -> Result<Plan, AppError> {
        Ok(self
            .get_subscription(org_id)
            .await?
            .map(|s| s.plan())
            .unwrap_or(Plan::Free))
    }

    /// Remember the Stripe customer created for an org.
    #[instrument(skip(self))]
    pub async fn set_stripe_customer(
        &self,
        org_id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET stripe_customer_id = $2, updated_utc = NOW()
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .bind(stripe_customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_sqlx(
                e,
                "Failed to store billing customer",
                "Billing customer already linked to another organization",
            )
        })?;

        Ok(())
    }

    /// Usage counters for the subscription's current period.
    #[instrument(skip(self, subscription), fields(org_id = %subscription.org_id))]
    pub async fn current_usage(&self, subscription: &Subscription) -> Result<UsageSummary, AppError> {
        let records = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT metric_name, metric_value
            FROM usage_tracking
            WHERE org_id = $1 AND period_start = $2
            "#,
        )
        .bind(subscription.org_id)
        .bind(subscription.current_period_start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read usage", e))?;

        Ok(UsageSummary::from_records(&records))
    }

    /// Apply a Stripe event once and log it.
    ///
    /// Returns `false` when the event id was already processed.
    #[instrument(skip(self, data, action), fields(event_type = %event_type))]
    pub async fn process_billing_event(
        &self,
        stripe_event_id: &str,
        event_type: &str,
        data: &serde_json::Value,
        action: &BillingEventAction,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["process_billing_event"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM billing_events WHERE stripe_event_id = $1)",
        )
        .bind(stripe_event_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to check billing event", e))?;

        if seen {
            info!(stripe_event_id = %stripe_event_id, "Duplicate billing event ignored");
            return Ok(false);
        }

        let org_id = match action.stripe_customer_id() {
            Some(customer) => org_for_customer(&mut tx, customer).await?,
            None => None,
        };

        match (org_id, action) {
            (None, BillingEventAction::Ignored { .. }) => {}
            (None, _) => {
                warn!(
                    stripe_event_id = %stripe_event_id,
                    customer = ?action.stripe_customer_id(),
                    "Billing event for unknown customer"
                );
            }
            (Some(org_id), BillingEventAction::SyncSubscription(sync)) => {
                sync_subscription(&mut tx, org_id, sync).await?;
            }
            (Some(org_id), BillingEventAction::SubscriptionDeleted { .. }) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET plan = $2, status = $3, billing_status = $4, canceled_utc = NOW(),
                        cancel_at_period_end = FALSE, updated_utc = NOW()
                    WHERE org_id = $1
                    "#,
                )
                .bind(org_id)
                .bind(Plan::Free.as_str())
                .bind(SUBSCRIPTION_INACTIVE)
                .bind(BillingStatus::Canceled.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to cancel subscription", e))?;
            }
            (Some(org_id), BillingEventAction::InvoicePaid { invoice, .. }) => {
                upsert_billing_invoice(&mut tx, org_id, invoice).await?;
            }
            (
                Some(org_id),
                BillingEventAction::PaymentFailed {
                    stripe_subscription_id,
                    ..
                },
            ) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions
                    SET billing_status = $3, updated_utc = NOW()
                    WHERE org_id = $1
                      AND ($2::text IS NULL OR stripe_subscription_id = $2)
                    "#,
                )
                .bind(org_id)
                .bind(stripe_subscription_id)
                .bind(BillingStatus::PastDue.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to mark subscription past due", e))?;
            }
            (Some(_), BillingEventAction::Ignored { .. }) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO billing_events (billing_event_id, org_id, stripe_event_id, event_type, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(stripe_event_id)
        .bind(event_type)
        .bind(data)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to store billing event", e))?;

        tx.commit().await?;

        timer.observe_duration();
        info!(
            stripe_event_id = %stripe_event_id,
            org_id = ?org_id,
            "Billing event processed"
        );

        Ok(true)
    }
}

async fn org_for_customer(
    conn: &mut PgConnection,
    stripe_customer_id: &str,
) -> Result<Option<Uuid>, AppError> {
    sqlx::query_scalar("SELECT org_id FROM subscriptions WHERE stripe_customer_id = $1")
        .bind(stripe_customer_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to resolve billing customer", e))
}

async fn sync_subscription(
    conn: &mut PgConnection,
    org_id: Uuid,
    sync: &SubscriptionSync,
) -> Result<(), AppError> {
    let status = if sync.billing_status.grants_access() {
        SUBSCRIPTION_ACTIVE
    } else {
        SUBSCRIPTION_INACTIVE
    };

    sqlx::query(
        r#"
        UPDATE subscriptions
        SET plan = $2,
            status = $3,
            billing_status = $4,
            stripe_subscription_id = $5,
            current_period_start = COALESCE($6, current_period_start),
            current_period_end = $7,
            trial_end = $8,
            cancel_at_period_end = $9,
            canceled_utc = $10,
            updated_utc = NOW()
        WHERE org_id = $1
        "#,
    )
    .bind(org_id)
    .bind(sync.plan.as_str())
    .bind(status)
    .bind(sync.billing_status.as_str())
    .bind(&sync.stripe_subscription_id)
    .bind(sync.current_period_start)
    .bind(sync.current_period_end)
    .bind(sync.trial_end)
    .bind(sync.cancel_at_period_end)
    .bind(sync.canceled_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to sync subscription", e))?;

    info!(
        org_id = %org_id,
        plan = sync.plan.as_str(),
        billing_status = sync.billing_status.as_str(),
        "Subscription synchronized"
    );

    Ok(())
}

async fn upsert_billing_invoice(
    conn: &mut PgConnection,
    org_id: Uuid,
    invoice: &UpsertBillingInvoice,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO billing_invoices (billing_invoice_id, org_id, stripe_invoice_id, amount_cents,
                                      currency, status, invoice_pdf, hosted_invoice_url,
                                      period_start, period_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (stripe_invoice_id) DO UPDATE
        SET amount_cents = EXCLUDED.amount_cents,
            currency = EXCLUDED.currency,
            status = EXCLUDED.status,
            invoice_pdf = EXCLUDED.invoice_pdf,
            hosted_invoice_url = EXCLUDED.hosted_invoice_url,
            period_start = EXCLUDED.period_start,
            period_end = EXCLUDED.period_end,
            paid_utc = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(org_id)
    .bind(&invoice.stripe_invoice_id)
    .bind(invoice.amount_cents)
    .bind(&invoice.currency)
    .bind(&invoice.status)
    .bind(&invoice.invoice_pdf)
    .bind(&invoice.hosted_invoice_url)
    .bind(invoice.period_start)
    .bind(invoice.period_end)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to store billing invoice", e))?;

    Ok(())
}
