//! Audit recorder: append-only trail plus the admin listing.
//!
//! Events are written on whatever connection or transaction the caller
//! holds, so an operation's data writes and its audit rows commit together.

use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::authorization::{AccessGuard, Operation};
use crate::config::AUDIT_QUERY_LIMIT;
use crate::db::{repository, DatabaseError};
use crate::error::VaultError;
use crate::models::{AuditAction, AuditEvent, Principal, SortOrder};

/// Current UTC wall clock, as stored in `audit_logs.timestamp`.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Append an event stamped with the current time.
pub fn record(
    conn: &Connection,
    user_id: Option<i64>,
    action: AuditAction,
    details: Option<&str>,
) -> Result<(), DatabaseError> {
    record_at(conn, user_id, action, details, now())
}

pub fn record_at(
    conn: &Connection,
    user_id: Option<i64>,
    action: AuditAction,
    details: Option<&str>,
    timestamp: NaiveDateTime,
) -> Result<(), DatabaseError> {
    repository::insert_audit_event(conn, user_id, action, details, timestamp)?;
    tracing::debug!(action = action.as_str(), user_id, "Audit event recorded");
    Ok(())
}

/// Filter for the admin audit listing. Both dates are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub order: SortOrder,
}

impl AuditQuery {
    /// `[start 00:00, end + 1 day 00:00)` as timestamps.
    fn window(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let start = self.start_date.and_then(|d| d.and_hms_opt(0, 0, 0));
        let end = self
            .end_date
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        (start, end)
    }
}

/// Admin-only listing of the trail, capped at [`AUDIT_QUERY_LIMIT`] events.
pub fn list_audit_events(
    conn: &Connection,
    guard: &AccessGuard,
    principal: &Principal,
    query: &AuditQuery,
) -> Result<Vec<AuditEvent>, VaultError> {
    guard.authorize(conn, principal, Operation::ReadAuditLog)?;

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(VaultError::ValidationFailed(
                "start_date must not be after end_date".into(),
            ));
        }
    }

    let (start, end) = query.window();
    let events = repository::query_audit_events(conn, start, end, query.order, AUDIT_QUERY_LIMIT)?;
    tracing::info!(user_id = principal.id, count = events.len(), "Audit log listed");
    Ok(events)
}
