use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{AuditAction, AuditEvent, SortOrder};

/// Append one audit event. Callers pass the transaction of the operation
/// being audited so the event commits or rolls back with it.
pub fn insert_audit_event(
    conn: &Connection,
    user_id: Option<i64>,
    action: AuditAction,
    details: Option<&str>,
    timestamp: NaiveDateTime,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_logs (user_id, action, details, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, action.as_str(), details, timestamp],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events with `start <= timestamp < end_exclusive`, newest or oldest first,
/// at most `limit` rows.
pub fn query_audit_events(
    conn: &Connection,
    start: Option<NaiveDateTime>,
    end_exclusive: Option<NaiveDateTime>,
    order: SortOrder,
    limit: usize,
) -> Result<Vec<AuditEvent>, DatabaseError> {
    let direction = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let sql = format!(
        "SELECT id, user_id, action, details, timestamp FROM audit_logs
         WHERE (?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR timestamp < ?2)
         ORDER BY timestamp {direction}, id {direction}
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![start, end_exclusive, limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, NaiveDateTime>(4)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, user_id, action, details, timestamp) = row?;
        events.push(AuditEvent {
            id,
            user_id,
            action: AuditAction::from_str(&action)?,
            details,
            timestamp,
        });
    }
    Ok(events)
}

/// Count events carrying `action`, optionally for one user.
pub fn count_audit_events(
    conn: &Connection,
    action: AuditAction,
    user_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM audit_logs WHERE action = ?1 AND (?2 IS NULL OR user_id = ?2)",
        params![action.as_str(), user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
