use uuid::Uuid;

/// Audit trail entry written alongside sensitive mutations.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub org_id: Uuid,
    pub user_id: String,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: Uuid,
    pub diff: Option<serde_json::Value>,
}
