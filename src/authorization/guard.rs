//! Access guard: one policy per protected operation, evaluated before the
//! operation touches anything.
//!
//! Policies are composable predicates over a principal. Name-equality checks
//! (`RoleNamed`) and capability checks (`AnyPermission`) coexist; see
//! [`Operation::policy`] for which operation uses which.

use rusqlite::Connection;

use super::resolver::{resolve, Grants, ResolutionMode};
use super::MANAGER_ROLE;
use crate::audit;
use crate::error::VaultError;
use crate::models::{AuditAction, PatientRow, Principal, Role};

// ═══════════════════════════════════════════════════════════
// Policies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Role name is exactly "Admin".
    Admin,
    /// Role name equals the given name. Admin also passes.
    RoleNamed(&'static str),
    /// Admin, or any one of the permissions is granted.
    AnyPermission(&'static [&'static str]),
    AllOf(&'static [Policy]),
    AnyOf(&'static [Policy]),
}

impl Policy {
    pub fn evaluate(&self, role: &Role, grants: &Grants) -> bool {
        match self {
            Self::Admin => grants.is_admin(),
            Self::RoleNamed(name) => grants.is_admin() || role.name == *name,
            Self::AnyPermission(required) => grants.has_any(required),
            Self::AllOf(policies) => policies.iter().all(|p| p.evaluate(role, grants)),
            Self::AnyOf(policies) => policies.iter().any(|p| p.evaluate(role, grants)),
        }
    }
}

/// Every gated operation in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListPatients,
    IngestPatients,
    UpdatePatient,
    DeletePatient,
    BulkDeletePatients,
    ViewStatistics,
    ReadDirectory,
    AdminWrite,
    ReadAuditLog,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListPatients => "list_patients",
            Self::IngestPatients => "ingest_patients",
            Self::UpdatePatient => "update_patient",
            Self::DeletePatient => "delete_patient",
            Self::BulkDeletePatients => "bulk_delete_patients",
            Self::ViewStatistics => "view_statistics",
            Self::ReadDirectory => "read_directory",
            Self::AdminWrite => "admin_write",
            Self::ReadAuditLog => "read_audit_log",
        }
    }

    /// Single-record update and delete gate on the Manager role name while
    /// bulk delete gates on `patient.delete`. Both are kept as-is.
    pub fn policy(self) -> Policy {
        match self {
            Self::ListPatients => Policy::AnyPermission(&["patient.read"]),
            Self::IngestPatients => Policy::AnyPermission(&["patient.create"]),
            Self::UpdatePatient | Self::DeletePatient => Policy::RoleNamed(MANAGER_ROLE),
            Self::BulkDeletePatients => Policy::AnyPermission(&["patient.delete"]),
            Self::ViewStatistics => Policy::AnyPermission(&["report.view"]),
            Self::ReadDirectory => Policy::AnyPermission(&["user.read", "admin.access"]),
            Self::AdminWrite | Self::ReadAuditLog => Policy::Admin,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════

/// Evaluates operation policies under one resolution mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGuard {
    mode: ResolutionMode,
}

impl AccessGuard {
    pub fn new(mode: ResolutionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Pure decision, no side effects.
    pub fn permits(&self, conn: &Connection, principal: &Principal, op: Operation) -> Result<bool, VaultError> {
        if !principal.is_active {
            return Ok(false);
        }
        let grants = resolve(conn, &principal.role, self.mode)?;
        Ok(op.policy().evaluate(&principal.role, &grants))
    }

    /// Fail with `Forbidden` unless `principal` may run `op`. A denial is
    /// audited on `conn` outside any operation transaction.
    pub fn authorize(&self, conn: &Connection, principal: &Principal, op: Operation) -> Result<(), VaultError> {
        if self.permits(conn, principal, op)? {
            return Ok(());
        }
        tracing::warn!(user_id = principal.id, operation = op.as_str(), "Access denied");
        audit::record(conn, Some(principal.id), AuditAction::AccessDenied, Some(op.as_str()))?;
        Err(VaultError::Forbidden { operation: op.as_str() })
    }
}

/// Ownership never bypasses: Admin included. A foreign record is reported
/// as absent so its existence does not leak.
pub fn require_ownership(principal: &Principal, record: &PatientRow) -> Result<(), VaultError> {
    if record.manager_id == principal.id {
        Ok(())
    } else {
        Err(VaultError::NotFound("Patient not found".into()))
    }
}
