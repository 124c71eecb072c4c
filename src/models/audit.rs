use chrono::NaiveDateTime;
use serde::Serialize;

use super::enums::AuditAction;

/// One immutable entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub id: i64,
    /// `None` when the actor could not be resolved (e.g. unknown login).
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub details: Option<String>,
    pub timestamp: NaiveDateTime,
}
