//! Bulk ingest: schema gate, global uniqueness gate, encrypt, one
//! all-or-nothing insert.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Deserialize;

use crate::audit;
use crate::authorization::{AccessGuard, Operation};
use crate::config::DUPLICATE_REPORT_LIMIT;
use crate::crypto::FieldCipher;
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, NewPatient, PatientRow, Principal};

/// Column headers a batch must carry, and nothing else.
pub const REQUIRED_COLUMNS: [&str; 5] = ["Patient ID", "First Name", "Last Name", "DOB", "Gender"];

/// A tabular batch as read from a spreadsheet: header row plus data rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl IngestBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Check the header and map each row to a [`NewPatient`].
    pub fn into_patients(self) -> Result<Vec<NewPatient>, VaultError> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.columns.iter().any(|h| h == *c))
            .collect();
        if !missing.is_empty() {
            return Err(VaultError::ValidationFailed(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }

        let unexpected: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|h| !REQUIRED_COLUMNS.contains(h))
            .collect();
        if !unexpected.is_empty() || self.columns.len() != REQUIRED_COLUMNS.len() {
            return Err(VaultError::ValidationFailed(format!(
                "Batch must have exactly the columns {}; unexpected: {}",
                REQUIRED_COLUMNS.join(", "),
                if unexpected.is_empty() { "repeated header".to_string() } else { unexpected.join(", ") }
            )));
        }

        let index = |name: &str| self.columns.iter().position(|h| h == name).unwrap_or(0);
        let [pid, first, last, dob, gender] = REQUIRED_COLUMNS.map(index);

        let mut patients = Vec::with_capacity(self.rows.len());
        for (n, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(VaultError::ValidationFailed(format!(
                    "Row {} has {} cells, expected {}",
                    n + 1,
                    row.len(),
                    self.columns.len()
                )));
            }
            let patient_id = row[pid].trim();
            if patient_id.is_empty() {
                return Err(VaultError::ValidationFailed(format!("Row {} has no Patient ID", n + 1)));
            }
            patients.push(NewPatient {
                patient_id: patient_id.to_string(),
                first_name: row[first].clone(),
                last_name: row[last].clone(),
                dob: row[dob].clone(),
                gender: row[gender].clone(),
            });
        }
        Ok(patients)
    }
}

/// Identifiers repeated inside the batch, in first-repeat order.
fn repeated_in_batch(patients: &[NewPatient]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for p in patients {
        if !seen.insert(p.patient_id.as_str()) && !repeated.contains(&p.patient_id) {
            repeated.push(p.patient_id.clone());
        }
    }
    repeated
}

fn duplicate_error(mut colliding: Vec<String>) -> VaultError {
    colliding.truncate(DUPLICATE_REPORT_LIMIT);
    VaultError::DuplicatePatients { colliding }
}

/// Ids of `rows` already present anywhere in the store, in batch order.
fn colliding_ids(conn: &Connection, rows: &[PatientRow]) -> Result<Vec<String>, VaultError> {
    let ids: Vec<String> = rows.iter().map(|r| r.patient_id.clone()).collect();
    let existing = repository::existing_patient_ids(conn, &ids)?;
    Ok(ids.into_iter().filter(|id| existing.contains(id)).collect())
}

/// Check store-wide uniqueness and insert, both on the caller's transaction.
fn store_rows(tx: &Connection, rows: &[PatientRow]) -> Result<usize, VaultError> {
    let colliding = colliding_ids(tx, rows)?;
    if !colliding.is_empty() {
        return Err(duplicate_error(colliding));
    }
    insert_reporting_collisions(tx, rows)
}

/// Insert, naming the ids of any row another writer committed first.
fn insert_reporting_collisions(tx: &Connection, rows: &[PatientRow]) -> Result<usize, VaultError> {
    match repository::insert_patient_rows(tx, rows) {
        Ok(count) => Ok(count),
        Err(e) if e.is_unique_violation() => {
            let colliding = colliding_ids(tx, rows)?;
            if colliding.is_empty() {
                Err(VaultError::Conflict("A patient ID in the batch already exists".into()))
            } else {
                Err(duplicate_error(colliding))
            }
        }
        Err(e) => Err(VaultError::Storage(e)),
    }
}

/// Ingest a batch owned by `principal`. Returns how many records were stored.
///
/// Nothing is persisted unless every row passes every gate.
pub fn ingest_patients(
    conn: &Connection,
    guard: &AccessGuard,
    cipher: &FieldCipher,
    principal: &Principal,
    batch: IngestBatch,
) -> Result<usize, VaultError> {
    guard.authorize(conn, principal, Operation::IngestPatients)?;

    let patients = batch.into_patients()?;
    if patients.is_empty() {
        return Err(VaultError::ValidationFailed("The batch contains no rows".into()));
    }

    let repeated = repeated_in_batch(&patients);
    if !repeated.is_empty() {
        return Err(duplicate_error(repeated));
    }

    let mut rows = Vec::with_capacity(patients.len());
    for p in &patients {
        rows.push(PatientRow {
            id: 0,
            patient_id: p.patient_id.clone(),
            first_name: cipher.encrypt(&p.first_name)?,
            last_name: cipher.encrypt(&p.last_name)?,
            dob: cipher.encrypt(&p.dob)?,
            gender: cipher.encrypt(&p.gender)?,
            manager_id: principal.id,
        });
    }

    let tx = conn.unchecked_transaction()?;
    let count = store_rows(&tx, &rows)?;
    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::UploadPatients,
        Some(&format!("Uploaded {count} patients")),
    )?;
    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::EncryptionOperation,
        Some(&format!("Encrypted {count} patient records")),
    )?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, count, "Patient batch ingested");
    Ok(count)
}
