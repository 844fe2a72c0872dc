//! Organizations, outlets and members.

use super::{db_error, record_audit, Database};
use crate::models::{
    AuditEntry, CreateOrganization, Member, OrgMembership, Organization, Outlet, Plan, Role,
    SUBSCRIPTION_ACTIVE,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

const DEFAULT_OUTLET_NAME: &str = "Main Outlet";

impl Database {
    /// Organizations the user belongs to, newest first.
    #[instrument(skip(self))]
    pub async fn list_memberships(&self, user_id: &str) -> Result<Vec<OrgMembership>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_memberships"])
            .start_timer();

        let rows = sqlx::query_as::<_, OrgMembership>(
            r#"
            SELECT m.role, o.org_id, o.name, o.slug, o.country, o.currency, o.created_utc
            FROM members m
            JOIN organizations o ON o.org_id = m.org_id
            WHERE m.user_id = $1
            ORDER BY o.created_utc DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list memberships", e))?;

        timer.observe_duration();
        Ok(rows)
    }

    /// Create an organization with its owner, default outlet and free subscription.
    #[instrument(skip(self, input), fields(owner = %input.owner_user_id))]
    pub async fn create_organization(
        &self,
        input: &CreateOrganization,
    ) -> Result<Organization, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_organization"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let org = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (org_id, name, slug, country, currency, owner_user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING org_id, name, slug, country, currency, owner_user_id, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.country)
        .bind(&input.currency)
        .bind(&input.owner_user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_sqlx(e, "Failed to create organization", "Slug is already taken")
        })?;

        sqlx::query(
            r#"
            INSERT INTO members (member_id, org_id, user_id, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org.org_id)
        .bind(&input.owner_user_id)
        .bind(Role::Owner.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create owner membership", e))?;

        sqlx::query("INSERT INTO outlets (outlet_id, org_id, name) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(org.org_id)
            .bind(DEFAULT_OUTLET_NAME)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to create default outlet", e))?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (subscription_id, org_id, plan, status, current_period_start)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org.org_id)
        .bind(Plan::Free.as_str())
        .bind(SUBSCRIPTION_ACTIVE)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create subscription", e))?;

        tx.commit().await?;

        timer.observe_duration();
        info!(org_id = %org.org_id, name = %org.name, "Organization created");

        Ok(org)
    }

    #[instrument(skip(self))]
    pub async fn get_organization(&self, org_id: Uuid) -> Result<Option<Organization>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_organization"])
            .start_timer();

        let org = sqlx::query_as::<_, Organization>(
            r#"
            SELECT org_id, name, slug, country, currency, owner_user_id, created_utc, updated_utc
            FROM organizations
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get organization", e))?;

        timer.observe_duration();
        Ok(org)
    }

    #[instrument(skip(self))]
    pub async fn get_member(&self, org_id: Uuid, user_id: &str) -> Result<Option<Member>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_member"])
            .start_timer();

        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT member_id, org_id, user_id, role, allowed_outlet_ids, invited_by, created_utc
            FROM members
            WHERE org_id = $1 AND user_id = $2
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get member", e))?;

        timer.observe_duration();
        Ok(member)
    }

    #[instrument(skip(self))]
    pub async fn list_members(&self, org_id: Uuid) -> Result<Vec<Member>, AppError> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT member_id, org_id, user_id, role, allowed_outlet_ids, invited_by, created_utc
            FROM members
            WHERE org_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list members", e))?;

        Ok(members)
    }

    pub async fn count_members(&self, org_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM members WHERE org_id = $1")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count members", e))
    }

    /// Add a member and record who invited them.
    #[instrument(skip(self, allowed_outlet_ids))]
    pub async fn add_member(
        &self,
        org_id: Uuid,
        user_id: &str,
        role: Role,
        allowed_outlet_ids: &[Uuid],
        invited_by: &str,
    ) -> Result<Member, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_member"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let member = sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (member_id, org_id, user_id, role, allowed_outlet_ids, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING member_id, org_id, user_id, role, allowed_outlet_ids, invited_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(allowed_outlet_ids)
        .bind(invited_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_sqlx(e, "Failed to add member", "User is already a member"))?;

        record_audit(
            &mut tx,
            &AuditEntry {
                org_id,
                user_id: invited_by.to_string(),
                action: "member.added",
                entity: "member",
                entity_id: member.member_id,
                diff: Some(serde_json::json!({
                    "user_id": user_id,
                    "role": role.as_str(),
                    "allowed_outlet_ids": allowed_outlet_ids,
                })),
            },
        )
        .await?;

        tx.commit().await?;

        timer.observe_duration();
        info!(org_id = %org_id, member_id = %member.member_id, role = role.as_str(), "Member added");

        Ok(member)
    }

    /// Outlets of an org, optionally restricted to an allow-list.
    #[instrument(skip(self, restrict_to))]
    pub async fn list_outlets(
        &self,
        org_id: Uuid,
        restrict_to: Option<&[Uuid]>,
    ) -> Result<Vec<Outlet>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_outlets"])
            .start_timer();

        let outlets = sqlx::query_as::<_, Outlet>(
            r#"
            SELECT outlet_id, org_id, name, address, created_utc
            FROM outlets
            WHERE org_id = $1
              AND ($2::uuid[] IS NULL OR outlet_id = ANY($2))
            ORDER BY created_utc
            "#,
        )
        .bind(org_id)
        .bind(restrict_to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list outlets", e))?;

        timer.observe_duration();
        Ok(outlets)
    }

    pub async fn get_outlet(&self, org_id: Uuid, outlet_id: Uuid) -> Result<Option<Outlet>, AppError> {
        sqlx::query_as::<_, Outlet>(
            r#"
            SELECT outlet_id, org_id, name, address, created_utc
            FROM outlets
            WHERE org_id = $1 AND outlet_id = $2
            "#,
        )
        .bind(org_id)
        .bind(outlet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get outlet", e))
    }

    pub async fn count_outlets(&self, org_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outlets WHERE org_id = $1")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count outlets", e))
    }

    /// How many of `outlet_ids` belong to the org.
    pub async fn count_org_outlets(&self, org_id: Uuid, outlet_ids: &[Uuid]) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM outlets WHERE org_id = $1 AND outlet_id = ANY($2)",
        )
        .bind(org_id)
        .bind(outlet_ids)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check outlets", e))
    }

    #[instrument(skip(self, address))]
    pub async fn create_outlet(
        &self,
        org_id: Uuid,
        name: &str,
        address: Option<&str>,
    ) -> Result<Outlet, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_outlet"])
            .start_timer();

        let outlet = sqlx::query_as::<_, Outlet>(
            r#"
            INSERT INTO outlets (outlet_id, org_id, name, address)
            VALUES ($1, $2, $3, $4)
            RETURNING outlet_id, org_id, name, address, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(name)
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create outlet", e))?;

        timer.observe_duration();
        info!(org_id = %org_id, outlet_id = %outlet.outlet_id, "Outlet created");

        Ok(outlet)
    }
}
