use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{Permission, Role};

/// Insert a permission, or return the id of the existing one with that name.
pub fn upsert_permission(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO permissions (name, description) VALUES (?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        params![name, description],
    )?;
    let id = conn.query_row(
        "SELECT id FROM permissions WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_permission_by_name(conn: &Connection, name: &str) -> Result<Option<Permission>, DatabaseError> {
    let permission = conn
        .query_row(
            "SELECT id, name, description FROM permissions WHERE name = ?1",
            params![name],
            |row| {
                Ok(Permission {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(permission)
}

pub fn list_permissions(conn: &Connection) -> Result<Vec<Permission>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM permissions ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Permission {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn insert_role(conn: &Connection, name: &str, parent_id: Option<i64>) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO roles (name, parent_id) VALUES (?1, ?2)",
        params![name, parent_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_role_parent(conn: &Connection, role_id: i64, parent_id: Option<i64>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE roles SET parent_id = ?2 WHERE id = ?1",
        params![role_id, parent_id],
    )?;
    Ok(())
}

/// Direct grants of one role, sorted by name.
pub fn get_role_permissions(conn: &Connection, role_id: i64) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.name FROM role_permissions rp
         JOIN permissions p ON p.id = rp.permission_id
         WHERE rp.role_id = ?1
         ORDER BY p.name",
    )?;
    let rows = stmt.query_map(params![role_id], |row| row.get::<_, String>(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Replace the grant set of a role.
pub fn replace_role_permissions(
    conn: &Connection,
    role_id: i64,
    permission_ids: &[i64],
) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM role_permissions WHERE role_id = ?1", params![role_id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
    )?;
    for permission_id in permission_ids {
        stmt.execute(params![role_id, permission_id])?;
    }
    Ok(())
}

pub fn get_role(conn: &Connection, role_id: i64) -> Result<Option<Role>, DatabaseError> {
    let header = conn
        .query_row(
            "SELECT id, name, parent_id FROM roles WHERE id = ?1",
            params![role_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<i64>>(2)?)),
        )
        .optional()?;

    match header {
        Some((id, name, parent_id)) => Ok(Some(Role {
            permissions: get_role_permissions(conn, id)?,
            id,
            name,
            parent_id,
        })),
        None => Ok(None),
    }
}

pub fn get_role_by_name(conn: &Connection, name: &str) -> Result<Option<Role>, DatabaseError> {
    let id: Option<i64> = conn
        .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;
    match id {
        Some(id) => get_role(conn, id),
        None => Ok(None),
    }
}

pub fn list_roles(conn: &Connection) -> Result<Vec<Role>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM roles ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut roles = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(role) = get_role(conn, id)? {
            roles.push(role);
        }
    }
    Ok(roles)
}
