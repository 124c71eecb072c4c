//! Role catalogue and directory administration.
//!
//! Writes are Admin-only; reads need `user.read` or `admin.access`.

use rusqlite::Connection;

use crate::audit;
use crate::authorization::{AccessGuard, Operation};
use crate::db::{repository, DatabaseError};
use crate::error::VaultError;
use crate::models::{AuditAction, Location, Permission, Principal, Role, Team};

fn non_blank(kind: &str, name: &str) -> Result<String, VaultError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(VaultError::ValidationFailed(format!("{kind} name must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn conflict_on_unique(kind: &str, name: &str) -> impl FnOnce(DatabaseError) -> VaultError {
    let message = format!("{kind} '{name}' already exists");
    move |e| {
        if e.is_unique_violation() {
            VaultError::Conflict(message)
        } else {
            VaultError::Storage(e)
        }
    }
}

pub fn create_role(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    name: &str,
    parent_id: Option<i64>,
) -> Result<Role, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;
    let name = non_blank("Role", name)?;

    let tx = conn.unchecked_transaction()?;
    if let Some(parent) = parent_id {
        if repository::get_role(&tx, parent)?.is_none() {
            return Err(VaultError::ValidationFailed(format!("Unknown parent role {parent}")));
        }
    }
    let id = repository::insert_role(&tx, &name, parent_id).map_err(conflict_on_unique("Role", &name))?;
    audit::record(&tx, Some(admin.id), AuditAction::AdminCreateRole, Some(&format!("Created role {name}")))?;
    let role = repository::get_role(&tx, id)?.ok_or_else(|| VaultError::NotFound("Role not found".into()))?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, role_id = id, "Role created");
    Ok(role)
}

/// Replace a role's grant set with the named permissions.
pub fn set_role_permissions(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    role_id: i64,
    permission_names: &[String],
) -> Result<Role, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;

    let tx = conn.unchecked_transaction()?;
    let role = repository::get_role(&tx, role_id)?.ok_or_else(|| VaultError::NotFound("Role not found".into()))?;

    let mut ids = Vec::with_capacity(permission_names.len());
    let mut unknown = Vec::new();
    for name in permission_names {
        match repository::get_permission_by_name(&tx, name)? {
            Some(permission) => ids.push(permission.id),
            None => unknown.push(name.as_str()),
        }
    }
    if !unknown.is_empty() {
        return Err(VaultError::ValidationFailed(format!(
            "Unknown permissions: {}",
            unknown.join(", ")
        )));
    }

    repository::replace_role_permissions(&tx, role.id, &ids)?;
    audit::record(
        &tx,
        Some(admin.id),
        AuditAction::AdminUpdateRolePerms,
        Some(&format!("Set {} permissions on role {}", ids.len(), role.name)),
    )?;
    let updated = repository::get_role(&tx, role.id)?.ok_or_else(|| VaultError::NotFound("Role not found".into()))?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, role_id, granted = ids.len(), "Role permissions replaced");
    Ok(updated)
}

pub fn create_location(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    name: &str,
) -> Result<Location, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;
    let name = non_blank("Location", name)?;

    let tx = conn.unchecked_transaction()?;
    let id = repository::insert_location(&tx, &name).map_err(conflict_on_unique("Location", &name))?;
    audit::record(&tx, Some(admin.id), AuditAction::AdminCreateLocation, Some(&format!("Created location {name}")))?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, location_id = id, "Location created");
    Ok(Location { id, name })
}

pub fn create_team(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    name: &str,
) -> Result<Team, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;
    let name = non_blank("Team", name)?;

    let tx = conn.unchecked_transaction()?;
    let id = repository::insert_team(&tx, &name).map_err(conflict_on_unique("Team", &name))?;
    audit::record(&tx, Some(admin.id), AuditAction::AdminCreateTeam, Some(&format!("Created team {name}")))?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, team_id = id, "Team created");
    Ok(Team { id, name })
}

// ── Directory reads ─────────────────────────────────────────

pub fn list_roles(conn: &Connection, guard: &AccessGuard, principal: &Principal) -> Result<Vec<Role>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadDirectory)?;
    Ok(repository::list_roles(conn)?)
}

pub fn list_permissions(
    conn: &Connection,
    guard: &AccessGuard,
    principal: &Principal,
) -> Result<Vec<Permission>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadDirectory)?;
    Ok(repository::list_permissions(conn)?)
}

pub fn list_locations(
    conn: &Connection,
    guard: &AccessGuard,
    principal: &Principal,
) -> Result<Vec<Location>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadDirectory)?;
    Ok(repository::list_locations(conn)?)
}

pub fn list_teams(conn: &Connection, guard: &AccessGuard, principal: &Principal) -> Result<Vec<Team>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadDirectory)?;
    Ok(repository::list_teams(conn)?)
}
