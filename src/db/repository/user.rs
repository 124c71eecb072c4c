use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::role::get_role;
use crate::db::DatabaseError;
use crate::models::{NewUser, Principal, ProfileUpdate, UserAssignment};

const USER_COLUMNS: &str = "id, email, full_name, phone_number, is_active, role_id, location_id, \
                            team_id, failed_login_attempts, locked_until";

struct UserRecord {
    id: i64,
    email: String,
    full_name: Option<String>,
    phone_number: Option<String>,
    is_active: bool,
    role_id: i64,
    location_id: i64,
    team_id: i64,
    failed_login_attempts: u32,
    locked_until: Option<NaiveDateTime>,
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        phone_number: row.get(3)?,
        is_active: row.get(4)?,
        role_id: row.get(5)?,
        location_id: row.get(6)?,
        team_id: row.get(7)?,
        failed_login_attempts: row.get(8)?,
        locked_until: row.get(9)?,
    })
}

fn into_principal(conn: &Connection, record: UserRecord) -> Result<Principal, DatabaseError> {
    let role = get_role(conn, record.role_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Role".into(),
        id: record.role_id.to_string(),
    })?;
    Ok(Principal {
        id: record.id,
        email: record.email,
        full_name: record.full_name,
        phone_number: record.phone_number,
        is_active: record.is_active,
        role,
        location_id: record.location_id,
        team_id: record.team_id,
        failed_login_attempts: record.failed_login_attempts,
        locked_until: record.locked_until,
    })
}

pub fn insert_user(conn: &Connection, user: &NewUser, password_hash: &str) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (email, password_hash, role_id, location_id, team_id, full_name, phone_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.email,
            password_hash,
            user.role_id,
            user.location_id,
            user.team_id,
            user.full_name,
            user.phone_number,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Load a principal with its role and direct grants.
pub fn get_principal(conn: &Connection, user_id: i64) -> Result<Option<Principal>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let record = conn.query_row(&sql, params![user_id], record_from_row).optional()?;
    record.map(|r| into_principal(conn, r)).transpose()
}

/// Principal plus stored password hash, for credential checks.
pub fn find_credentials_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<(Principal, String)>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1");
    let found = conn
        .query_row(&sql, params![email], |row| {
            Ok((record_from_row(row)?, row.get::<_, String>(10)?))
        })
        .optional()?;
    match found {
        Some((record, hash)) => Ok(Some((into_principal(conn, record)?, hash))),
        None => Ok(None),
    }
}

pub fn get_password_hash(conn: &Connection, user_id: i64) -> Result<Option<String>, DatabaseError> {
    let hash = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

/// True when `email` belongs to a user other than `except_id`.
pub fn email_in_use(conn: &Connection, email: &str, except_id: Option<i64>) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1 AND (?2 IS NULL OR id != ?2)",
            params![email, except_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn set_login_state(
    conn: &Connection,
    user_id: i64,
    failed_login_attempts: u32,
    locked_until: Option<NaiveDateTime>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET failed_login_attempts = ?2, locked_until = ?3 WHERE id = ?1",
        params![user_id, failed_login_attempts, locked_until],
    )?;
    ensure_changed(changed, user_id)
}

pub fn update_password_hash(conn: &Connection, user_id: i64, password_hash: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![user_id, password_hash],
    )?;
    ensure_changed(changed, user_id)
}

pub fn update_profile(conn: &Connection, user_id: i64, update: &ProfileUpdate) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET
            full_name = COALESCE(?2, full_name),
            email = COALESCE(?3, email),
            phone_number = COALESCE(?4, phone_number)
         WHERE id = ?1",
        params![user_id, update.full_name, update.email, update.phone_number],
    )?;
    ensure_changed(changed, user_id)
}

pub fn update_assignment(
    conn: &Connection,
    user_id: i64,
    assignment: &UserAssignment,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET
            role_id = COALESCE(?2, role_id),
            location_id = COALESCE(?3, location_id),
            team_id = COALESCE(?4, team_id),
            phone_number = COALESCE(?5, phone_number)
         WHERE id = ?1",
        params![
            user_id,
            assignment.role_id,
            assignment.location_id,
            assignment.team_id,
            assignment.phone_number,
        ],
    )?;
    ensure_changed(changed, user_id)
}

pub fn list_principals(conn: &Connection) -> Result<Vec<Principal>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    records.into_iter().map(|r| into_principal(conn, r)).collect()
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

fn ensure_changed(changed: usize, user_id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}
