//! Principals: login with lockout, self-service profile and password,
//! administrative user management.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use rusqlite::Connection;

use crate::audit;
use crate::authorization::{AccessGuard, Operation};
use crate::config::{LOCKOUT_DURATION_MINUTES, MAX_FAILED_LOGIN_ATTEMPTS};
use crate::crypto::{verify_password, PasswordHasher};
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, NewUser, Principal, ProfileUpdate, UserAssignment};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern"));

fn validate_email(email: &str) -> Result<(), VaultError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(VaultError::ValidationFailed("Invalid email address".into()))
    }
}

fn validate_new_password(password: &str) -> Result<(), VaultError> {
    if password.is_empty() {
        return Err(VaultError::ValidationFailed("Password must not be empty".into()));
    }
    Ok(())
}

fn load_user(conn: &Connection, user_id: i64) -> Result<Principal, VaultError> {
    repository::get_principal(conn, user_id)?.ok_or_else(|| VaultError::NotFound("User not found".into()))
}

/// A stored hash that cannot be parsed never authenticates.
fn password_matches(password: &str, stored: &str) -> bool {
    match verify_password(password, stored) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(error = %e, "Stored credential is unreadable");
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Login
// ═══════════════════════════════════════════════════════════

/// Authenticate by email and password at time `now`.
///
/// Three consecutive failures lock the account for the cool-down period.
/// Attempts while locked are rejected without touching the counter. Counter
/// changes and their audit events commit even when the attempt fails.
pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    now: NaiveDateTime,
) -> Result<Principal, VaultError> {
    let tx = conn.unchecked_transaction()?;

    let Some((principal, stored_hash)) = repository::find_credentials_by_email(&tx, email)? else {
        audit::record_at(&tx, None, AuditAction::LoginFailed, Some("Unknown account"), now)?;
        tx.commit()?;
        tracing::warn!("Login rejected for unknown account");
        return Err(VaultError::InvalidCredentials);
    };

    let mut attempts = principal.failed_login_attempts;
    if let Some(until) = principal.locked_until {
        if now < until {
            audit::record_at(
                &tx,
                Some(principal.id),
                AuditAction::LoginLocked,
                Some("Login attempt while locked"),
                now,
            )?;
            tx.commit()?;
            tracing::warn!(user_id = principal.id, "Login rejected, account locked");
            return Err(VaultError::AccountLocked { until });
        }
        repository::set_login_state(&tx, principal.id, 0, None)?;
        attempts = 0;
    }

    if !password_matches(password, &stored_hash) || !principal.is_active {
        attempts += 1;
        let outcome = if attempts >= MAX_FAILED_LOGIN_ATTEMPTS {
            let until = now + Duration::minutes(LOCKOUT_DURATION_MINUTES);
            repository::set_login_state(&tx, principal.id, attempts, Some(until))?;
            audit::record_at(
                &tx,
                Some(principal.id),
                AuditAction::AccountLocked,
                Some(&format!("Locked after {attempts} failed attempts")),
                now,
            )?;
            tracing::warn!(user_id = principal.id, attempts, "Account locked");
            VaultError::AccountLocked { until }
        } else {
            repository::set_login_state(&tx, principal.id, attempts, None)?;
            audit::record_at(
                &tx,
                Some(principal.id),
                AuditAction::LoginFailed,
                Some(&format!("Attempt {attempts}/{MAX_FAILED_LOGIN_ATTEMPTS}")),
                now,
            )?;
            tracing::info!(user_id = principal.id, attempts, "Login failed");
            VaultError::InvalidCredentials
        };
        tx.commit()?;
        return Err(outcome);
    }

    repository::set_login_state(&tx, principal.id, 0, None)?;
    audit::record_at(&tx, Some(principal.id), AuditAction::LoginSuccess, None, now)?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, "Login succeeded");
    Ok(Principal {
        failed_login_attempts: 0,
        locked_until: None,
        ..principal
    })
}

// ═══════════════════════════════════════════════════════════
// Self-service
// ═══════════════════════════════════════════════════════════

pub fn change_password(
    conn: &Connection,
    hasher: &PasswordHasher,
    principal: &Principal,
    old_password: &str,
    new_password: &str,
) -> Result<(), VaultError> {
    validate_new_password(new_password)?;

    let tx = conn.unchecked_transaction()?;
    let stored = repository::get_password_hash(&tx, principal.id)?
        .ok_or_else(|| VaultError::NotFound("User not found".into()))?;
    if !password_matches(old_password, &stored) {
        return Err(VaultError::InvalidCredentials);
    }

    repository::update_password_hash(&tx, principal.id, &hasher.hash(new_password)?)?;
    audit::record(&tx, Some(principal.id), AuditAction::PasswordChange, Some("User changed password"))?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, "Credential changed");
    Ok(())
}

/// Update the caller's own name, contact number or address. Returns the
/// reloaded principal.
pub fn update_profile(
    conn: &Connection,
    principal: &Principal,
    update: &ProfileUpdate,
) -> Result<Principal, VaultError> {
    let tx = conn.unchecked_transaction()?;

    if let Some(email) = &update.email {
        validate_email(email)?;
        if repository::email_in_use(&tx, email, Some(principal.id))? {
            return Err(VaultError::Conflict("Email already registered".into()));
        }
    }

    repository::update_profile(&tx, principal.id, update)?;
    audit::record(&tx, Some(principal.id), AuditAction::ProfileUpdate, Some("User updated profile details"))?;
    let reloaded = load_user(&tx, principal.id)?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, "Profile updated");
    Ok(reloaded)
}

// ═══════════════════════════════════════════════════════════
// Administration
// ═══════════════════════════════════════════════════════════

fn check_references(
    conn: &Connection,
    role_id: Option<i64>,
    location_id: Option<i64>,
    team_id: Option<i64>,
) -> Result<(), VaultError> {
    if let Some(id) = role_id {
        if repository::get_role(conn, id)?.is_none() {
            return Err(VaultError::ValidationFailed(format!("Unknown role {id}")));
        }
    }
    if let Some(id) = location_id {
        if !repository::location_exists(conn, id)? {
            return Err(VaultError::ValidationFailed(format!("Unknown location {id}")));
        }
    }
    if let Some(id) = team_id {
        if !repository::team_exists(conn, id)? {
            return Err(VaultError::ValidationFailed(format!("Unknown team {id}")));
        }
    }
    Ok(())
}

pub fn create_user(
    conn: &Connection,
    guard: &AccessGuard,
    hasher: &PasswordHasher,
    admin: &Principal,
    user: &NewUser,
) -> Result<Principal, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;
    validate_email(&user.email)?;
    validate_new_password(&user.password)?;

    let tx = conn.unchecked_transaction()?;
    if repository::email_in_use(&tx, &user.email, None)? {
        return Err(VaultError::Conflict("Email already registered".into()));
    }
    check_references(&tx, Some(user.role_id), Some(user.location_id), Some(user.team_id))?;

    let id = repository::insert_user(&tx, user, &hasher.hash(&user.password)?)?;
    audit::record(&tx, Some(admin.id), AuditAction::AdminCreateUser, Some(&format!("Created user #{id}")))?;
    let created = load_user(&tx, id)?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, user_id = id, "User created");
    Ok(created)
}

/// Clear the failed-login counter and any lock.
pub fn unlock_user(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    user_id: i64,
) -> Result<(), VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;

    let tx = conn.unchecked_transaction()?;
    load_user(&tx, user_id)?;
    repository::set_login_state(&tx, user_id, 0, None)?;
    audit::record(&tx, Some(admin.id), AuditAction::AdminUnlockUser, Some(&format!("Unlocked user #{user_id}")))?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, user_id, "User unlocked");
    Ok(())
}

pub fn reset_password(
    conn: &Connection,
    guard: &AccessGuard,
    hasher: &PasswordHasher,
    admin: &Principal,
    user_id: i64,
    new_password: &str,
) -> Result<(), VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;
    validate_new_password(new_password)?;

    let tx = conn.unchecked_transaction()?;
    load_user(&tx, user_id)?;
    repository::update_password_hash(&tx, user_id, &hasher.hash(new_password)?)?;
    audit::record(
        &tx,
        Some(admin.id),
        AuditAction::AdminResetPassword,
        Some(&format!("Reset credential for user #{user_id}")),
    )?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, user_id, "Credential reset by admin");
    Ok(())
}

pub fn update_user_assignment(
    conn: &Connection,
    guard: &AccessGuard,
    admin: &Principal,
    user_id: i64,
    assignment: &UserAssignment,
) -> Result<Principal, VaultError> {
    guard.authorize(conn, admin, Operation::AdminWrite)?;

    let tx = conn.unchecked_transaction()?;
    load_user(&tx, user_id)?;
    check_references(&tx, assignment.role_id, assignment.location_id, assignment.team_id)?;
    repository::update_assignment(&tx, user_id, assignment)?;
    audit::record(
        &tx,
        Some(admin.id),
        AuditAction::AdminUpdateUser,
        Some(&format!("Updated user #{user_id} role/location")),
    )?;
    let updated = load_user(&tx, user_id)?;
    tx.commit()?;

    tracing::info!(admin_id = admin.id, user_id, "User assignment updated");
    Ok(updated)
}

pub fn list_users(conn: &Connection, guard: &AccessGuard, principal: &Principal) -> Result<Vec<Principal>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadDirectory)?;
    Ok(repository::list_principals(conn)?)
}
