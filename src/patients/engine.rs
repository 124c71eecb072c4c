use rusqlite::Connection;

use super::query::{decrypt_filter_sort_page, ListQuery, QueryStrategy};
use crate::audit;
use crate::authorization::{AccessGuard, Operation};
use crate::crypto::FieldCipher;
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, Patient, Principal};

/// List the caller's own records with optional search, sort and paging.
///
/// Both strategies return exactly what decrypting every owned record and
/// then filtering, sorting and paging in memory would return. Every call
/// appends one access event and one decryption event, committed with the
/// read.
pub fn list_patients(
    conn: &Connection,
    guard: &AccessGuard,
    cipher: &FieldCipher,
    principal: &Principal,
    query: &ListQuery,
) -> Result<Vec<Patient>, VaultError> {
    guard.authorize(conn, principal, Operation::ListPatients)?;

    let strategy = QueryStrategy::select(query);
    let tx = conn.unchecked_transaction()?;

    let (patients, decrypted) = match strategy {
        QueryStrategy::Fast => {
            let rows = repository::list_owned_patient_page(&tx, principal.id, query.limit, query.skip)?;
            let page: Vec<Patient> = rows
                .into_iter()
                .map(|row| Patient::decrypt(row, cipher))
                .collect();
            let decrypted = page.len();
            (page, decrypted)
        }
        QueryStrategy::Secure => {
            let rows = repository::list_owned_patients(&tx, principal.id)?;
            let decrypted = rows.len();
            (decrypt_filter_sort_page(rows, cipher, query), decrypted)
        }
    };

    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::AccessPatients,
        Some(&format!("Accessed patient list ({} returned)", patients.len())),
    )?;
    audit::record(
        &tx,
        Some(principal.id),
        AuditAction::DecryptionOperation,
        Some(&format!("Decrypted {decrypted} patient records for viewing")),
    )?;
    tx.commit()?;

    tracing::info!(
        user_id = principal.id,
        strategy = strategy.as_str(),
        returned = patients.len(),
        decrypted,
        "Patient list served"
    );
    Ok(patients)
}
