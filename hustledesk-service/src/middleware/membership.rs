//! Org membership and role gates used at the top of org-scoped handlers.

use crate::middleware::AuthUser;
use crate::models::{Member, Role};
use crate::services::Database;
use service_core::error::AppError;
use uuid::Uuid;

/// The caller's membership in `org_id`, or 403.
pub async fn require_member(
    db: &Database,
    org_id: Uuid,
    user: &AuthUser,
) -> Result<Member, AppError> {
    db.get_member(org_id, user.user_id())
        .await?
        .ok_or_else(|| {
            tracing::warn!(org_id = %org_id, user_id = %user.user_id(), "Non-member access denied");
            AppError::Forbidden(anyhow::anyhow!("Forbidden"))
        })
}

pub fn require_role(member: &Member, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&member.role()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!("Insufficient permissions")))
    }
}

/// OWNER or MANAGER.
pub fn require_manager(member: &Member) -> Result<(), AppError> {
    require_role(member, &[Role::Owner, Role::Manager])
}

pub fn require_outlet_access(member: &Member, outlet_id: Uuid) -> Result<(), AppError> {
    if member.has_outlet_access(outlet_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!("No access to this outlet")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use chrono::Utc;

    fn member(role: Role) -> Member {
        Member {
            member_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            role: role.as_str().to_string(),
            allowed_outlet_ids: vec![],
            invited_by: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn staff_is_not_a_manager() {
        let err = require_manager(&member(Role::Staff)).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
        assert!(require_manager(&member(Role::Manager)).is_ok());
    }

    #[test]
    fn owner_only_excludes_managers() {
        assert!(require_role(&member(Role::Manager), &[Role::Owner]).is_err());
        assert!(require_role(&member(Role::Owner), &[Role::Owner]).is_ok());
    }

    #[test]
    fn staff_outlet_access_follows_allow_list() {
        let staff = member(Role::Staff);
        assert!(require_outlet_access(&staff, Uuid::new_v4()).is_err());
    }
}
