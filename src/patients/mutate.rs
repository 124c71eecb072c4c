//! Single-record update/delete and owner-scoped bulk delete.
//!
//! Each mutation runs in one transaction together with its audit event.

use rusqlite::Connection;

use crate::audit;
use crate::authorization::{require_ownership, AccessGuard, Operation};
use crate::crypto::FieldCipher;
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, Patient, PatientRow, PatientUpdate, Principal};

fn load_owned(conn: &Connection, principal: &Principal, patient_id: &str) -> Result<PatientRow, VaultError> {
    let row = repository::find_patient(conn, patient_id)?
        .ok_or_else(|| VaultError::NotFound("Patient not found".into()))?;
    require_ownership(principal, &row)?;
    Ok(row)
}

/// Re-encrypt only the supplied fields; others keep their stored ciphertext.
pub fn update_patient(
    conn: &Connection,
    guard: &AccessGuard,
    cipher: &FieldCipher,
    principal: &Principal,
    patient_id: &str,
    update: &PatientUpdate,
) -> Result<Patient, VaultError> {
    guard.authorize(conn, principal, Operation::UpdatePatient)?;

    let tx = conn.unchecked_transaction()?;
    let mut row = load_owned(&tx, principal, patient_id)?;

    let targets = [
        (&update.first_name, &mut row.first_name),
        (&update.last_name, &mut row.last_name),
        (&update.dob, &mut row.dob),
        (&update.gender, &mut row.gender),
    ];
    for (supplied, stored) in targets {
        if let Some(value) = supplied {
            *stored = cipher.encrypt(value)?;
        }
    }

    repository::update_patient_ciphertext(&tx, &row)?;
    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::UpdatePatient,
        Some(&format!("Updated patient {patient_id}")),
    )?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, row_id = row.id, "Patient updated");
    Ok(Patient::decrypt(row, cipher))
}

pub fn delete_patient(
    conn: &Connection,
    guard: &AccessGuard,
    principal: &Principal,
    patient_id: &str,
) -> Result<(), VaultError> {
    guard.authorize(conn, principal, Operation::DeletePatient)?;

    let tx = conn.unchecked_transaction()?;
    let row = load_owned(&tx, principal, patient_id)?;
    repository::delete_owned_patient(&tx, &row.patient_id, principal.id)?;
    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::DeletePatient,
        Some(&format!("Deleted patient {patient_id}")),
    )?;
    tx.commit()?;

    tracing::info!(user_id = principal.id, row_id = row.id, "Patient deleted");
    Ok(())
}

/// Delete the caller's records among `patient_ids`. Foreign or unknown ids
/// are skipped silently. Returns how many records were removed.
pub fn bulk_delete_patients(
    conn: &Connection,
    guard: &AccessGuard,
    principal: &Principal,
    patient_ids: &[String],
) -> Result<usize, VaultError> {
    guard.authorize(conn, principal, Operation::BulkDeletePatients)?;

    if patient_ids.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let deleted = repository::delete_owned_patients(&tx, patient_ids, principal.id)?;
    if deleted > 0 {
        audit::record(
            &tx,
            Some(principal.id),
            AuditAction::BulkDelete,
            Some(&format!("Bulk deleted {deleted} patients")),
        )?;
    }
    tx.commit()?;

    tracing::info!(user_id = principal.id, requested = patient_ids.len(), deleted, "Bulk delete finished");
    Ok(deleted)
}
