//! Database service for hustledesk-service.
//!
//! Each submodule adds an `impl Database` block for one area of the API.
//! Multi-step writes take a single transaction; helpers that participate in
//! one accept `&mut PgConnection`.

mod billing;
mod catalog;
mod expenses;
mod invoices;
mod mpesa;
mod orders;

pub use orders::ListOrdersFilter;
mod orgs;
mod reports;
mod tasks;

use crate::models::{AuditEntry, UsageMetric};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "hustledesk-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn db_error(context: &str, err: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, err))
}

/// Increment a usage counter for the subscription's current period.
///
/// Orgs without a subscription row are not metered.
pub(crate) async fn bump_usage(
    conn: &mut PgConnection,
    org_id: Uuid,
    metric: UsageMetric,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO usage_tracking (org_id, metric_name, metric_value, period_start, period_end)
        SELECT org_id, $2, 1, current_period_start, current_period_end
        FROM subscriptions
        WHERE org_id = $1
        ON CONFLICT (org_id, metric_name, period_start)
        DO UPDATE SET metric_value = usage_tracking.metric_value + 1, updated_utc = NOW()
        "#,
    )
    .bind(org_id)
    .bind(metric.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to track usage", e))?;

    Ok(())
}

pub(crate) async fn record_audit(
    conn: &mut PgConnection,
    entry: &AuditEntry,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (audit_log_id, org_id, user_id, action, entity, entity_id, diff)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.org_id)
    .bind(&entry.user_id)
    .bind(entry.action)
    .bind(entry.entity)
    .bind(entry.entity_id)
    .bind(&entry.diff)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("Failed to write audit log", e))?;

    Ok(())
}

/// Escape LIKE wildcards so user search text matches literally.
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("mama"), "%mama%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
