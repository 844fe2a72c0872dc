//! Tenants, their outlets and the members who operate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Member role within one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Manager,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Manager => "MANAGER",
            Role::Staff => "STAFF",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "OWNER" => Role::Owner,
            "MANAGER" => Role::Manager,
            _ => Role::Staff,
        }
    }
}

/// Business account; every other row is scoped by its `org_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub org_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub country: String,
    pub currency: String,
    pub owner_user_id: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Sales location.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Outlet {
    pub outlet_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub member_id: Uuid,
    pub org_id: Uuid,
    pub user_id: String,
    pub role: String,
    pub allowed_outlet_ids: Vec<Uuid>,
    pub invited_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Member {
    pub fn role(&self) -> Role {
        Role::from_string(&self.role)
    }

    pub fn is_manager_or_owner(&self) -> bool {
        matches!(self.role(), Role::Owner | Role::Manager)
    }

    /// Owners and managers reach every outlet; staff only their allow-list.
    pub fn has_outlet_access(&self, outlet_id: Uuid) -> bool {
        self.is_manager_or_owner() || self.allowed_outlet_ids.contains(&outlet_id)
    }
}

/// One row of "organizations I belong to".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrgMembership {
    pub role: String,
    pub org_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub country: String,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
}

/// Fields needed to open a new organization.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: Option<String>,
    pub country: String,
    pub currency: String,
    pub owner_user_id: String,
}
