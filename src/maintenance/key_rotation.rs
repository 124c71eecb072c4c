//! Offline re-encryption of every record under a fresh key.
//!
//! Requires exclusive access to the store: no live traffic may encrypt or
//! decrypt while a rotation runs.

use rusqlite::Connection;
use serde::Serialize;

use crate::audit;
use crate::config::{KeyStore, ENCRYPTION_KEY_VAR};
use crate::crypto::{CryptoError, FieldCipher, FieldKey};
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, PatientRow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub total: usize,
    pub rotated: usize,
    pub failed: usize,
    /// Whether the new ciphertext and key were made durable.
    pub committed: bool,
}

impl RotationReport {
    fn should_commit(&self) -> bool {
        self.rotated > 0 || self.total == 0
    }
}

fn reencrypt(row: &PatientRow, old: &FieldCipher, new: &FieldCipher) -> Result<PatientRow, CryptoError> {
    Ok(PatientRow {
        first_name: new.encrypt(&old.try_decrypt(&row.first_name)?)?,
        last_name: new.encrypt(&old.try_decrypt(&row.last_name)?)?,
        dob: new.encrypt(&old.try_decrypt(&row.dob)?)?,
        gender: new.encrypt(&old.try_decrypt(&row.gender)?)?,
        ..row.clone()
    })
}

/// Re-encrypt every record from `old` to `new` and hand the result to
/// `persist_key` before committing.
///
/// Rows the old key cannot read are left untouched and counted as failed.
/// When nothing could be rotated in a non-empty store, the transaction is
/// rolled back and `persist_key` is never called. If `persist_key` fails the
/// rows roll back too, so ciphertext and durable key never diverge.
pub fn rotate_records<F>(
    conn: &Connection,
    old: &FieldCipher,
    new: &FieldCipher,
    persist_key: F,
) -> Result<RotationReport, VaultError>
where
    F: FnOnce() -> Result<(), VaultError>,
{
    let tx = conn.unchecked_transaction()?;
    let rows = repository::list_all_patients(&tx)?;
    let mut report = RotationReport {
        total: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        match reencrypt(row, old, new) {
            Ok(rotated) => {
                repository::update_patient_ciphertext(&tx, &rotated)?;
                report.rotated += 1;
            }
            Err(e) => {
                tracing::warn!(row_id = row.id, error = %e, "Record could not be rotated, skipped");
                report.failed += 1;
            }
        }
    }

    if !report.should_commit() {
        tracing::error!(total = report.total, "No record could be rotated, rolling back");
        return Ok(report);
    }

    audit::record(
        &tx,
        None,
        AuditAction::KeyRotation,
        Some(&format!(
            "Rotated {} of {} records ({} failed)",
            report.rotated, report.total, report.failed
        )),
    )?;
    persist_key()?;
    tx.commit()?;

    report.committed = true;
    tracing::info!(rotated = report.rotated, failed = report.failed, "Key rotation committed");
    Ok(report)
}

/// Current key: the key store first, then the process environment.
pub fn current_key(store: &KeyStore) -> Result<FieldKey, VaultError> {
    if let Some(key) = store.load()? {
        return Ok(key);
    }
    let raw = std::env::var(ENCRYPTION_KEY_VAR).map_err(|_| {
        VaultError::Config(format!(
            "no {ENCRYPTION_KEY_VAR} in {} or the environment",
            store.path().display()
        ))
    })?;
    FieldKey::from_base64(raw.trim()).map_err(|e| VaultError::Config(format!("invalid {ENCRYPTION_KEY_VAR}: {e}")))
}

/// Generate a new key, rotate every record to it and write it to `store`.
///
/// If the store write succeeds but the database commit fails, the old key
/// is written back.
pub fn rotate_store(conn: &Connection, store: &KeyStore) -> Result<RotationReport, VaultError> {
    let old_key = current_key(store)?;
    let new_key = FieldKey::generate();
    let old = FieldCipher::new(old_key);
    let new = FieldCipher::new(new_key);

    let mut key_written = false;
    let result = rotate_records(conn, &old, &new, || {
        store.store(new.key())?;
        key_written = true;
        Ok(())
    });

    if result.is_err() && key_written {
        tracing::error!("Commit failed after the key store was updated, restoring previous key");
        store.store(old.key())?;
    }
    result
}
