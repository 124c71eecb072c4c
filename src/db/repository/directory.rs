use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{Location, Team};

pub fn insert_location(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    conn.execute("INSERT INTO locations (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_location_by_name(conn: &Connection, name: &str) -> Result<Option<Location>, DatabaseError> {
    let location = conn
        .query_row(
            "SELECT id, name FROM locations WHERE name = ?1",
            params![name],
            |row| Ok(Location { id: row.get(0)?, name: row.get(1)? }),
        )
        .optional()?;
    Ok(location)
}

pub fn location_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM locations WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn list_locations(conn: &Connection) -> Result<Vec<Location>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM locations ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok(Location { id: row.get(0)?, name: row.get(1)? }))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn insert_team(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    conn.execute("INSERT INTO teams (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn get_team_by_name(conn: &Connection, name: &str) -> Result<Option<Team>, DatabaseError> {
    let team = conn
        .query_row(
            "SELECT id, name FROM teams WHERE name = ?1",
            params![name],
            |row| Ok(Team { id: row.get(0)?, name: row.get(1)? }),
        )
        .optional()?;
    Ok(team)
}

pub fn team_exists(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM teams WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub fn list_teams(conn: &Connection) -> Result<Vec<Team>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM teams ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok(Team { id: row.get(0)?, name: row.get(1)? }))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
