use std::collections::HashSet;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::PatientRow;

// Keeps bound parameters well under SQLite's variable limit.
const ID_CHUNK: usize = 500;

const PATIENT_COLUMNS: &str = "id, patient_id, first_name, last_name, dob, gender, manager_id";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        dob: row.get(4)?,
        gender: row.get(5)?,
        manager_id: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Insert already-encrypted rows. `id` on the input rows is ignored.
pub fn insert_patient_rows(conn: &Connection, rows: &[PatientRow]) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO patients (patient_id, first_name, last_name, dob, gender, manager_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.patient_id,
            row.first_name,
            row.last_name,
            row.dob,
            row.gender,
            row.manager_id,
        ])?;
    }
    Ok(rows.len())
}

/// Which of `patient_ids` already exist, regardless of owner.
pub fn existing_patient_ids(
    conn: &Connection,
    patient_ids: &[String],
) -> Result<HashSet<String>, DatabaseError> {
    let mut found = HashSet::new();
    for chunk in patient_ids.chunks(ID_CHUNK) {
        let sql = format!(
            "SELECT patient_id FROM patients WHERE patient_id IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
        for row in rows {
            found.insert(row?);
        }
    }
    Ok(found)
}

/// One page of a manager's rows in the listing's identifier order.
pub fn list_owned_patient_page(
    conn: &Connection,
    manager_id: i64,
    limit: usize,
    offset: usize,
) -> Result<Vec<PatientRow>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE manager_id = ?1
         ORDER BY patient_id COLLATE FOLDED
         LIMIT ?2 OFFSET ?3"
    );
    // SQLite reads a negative OFFSET as zero; saturate instead of wrapping.
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![manager_id, limit, offset], patient_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Every row owned by `manager_id`, unordered.
pub fn list_owned_patients(conn: &Connection, manager_id: i64) -> Result<Vec<PatientRow>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE manager_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![manager_id], patient_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Every row in the store.
pub fn list_all_patients(conn: &Connection) -> Result<Vec<PatientRow>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], patient_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Lookup by plaintext identifier, regardless of owner.
pub fn find_patient(conn: &Connection, patient_id: &str) -> Result<Option<PatientRow>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?1");
    let row = conn
        .query_row(&sql, params![patient_id], patient_from_row)
        .optional()?;
    Ok(row)
}

pub fn get_owned_patient(
    conn: &Connection,
    patient_id: &str,
    manager_id: i64,
) -> Result<Option<PatientRow>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?1 AND manager_id = ?2"
    );
    let row = conn
        .query_row(&sql, params![patient_id, manager_id], patient_from_row)
        .optional()?;
    Ok(row)
}

/// Overwrite the four ciphertext columns of a row.
pub fn update_patient_ciphertext(conn: &Connection, row: &PatientRow) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET first_name = ?2, last_name = ?3, dob = ?4, gender = ?5 WHERE id = ?1",
        params![row.id, row.first_name, row.last_name, row.dob, row.gender],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: row.id.to_string(),
        });
    }
    Ok(())
}

/// Delete one row if owned by `manager_id`. Returns whether a row went away.
pub fn delete_owned_patient(
    conn: &Connection,
    patient_id: &str,
    manager_id: i64,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM patients WHERE patient_id = ?1 AND manager_id = ?2",
        params![patient_id, manager_id],
    )?;
    Ok(changed > 0)
}

/// Delete the owned subset of `patient_ids`. Returns how many rows went away.
pub fn delete_owned_patients(
    conn: &Connection,
    patient_ids: &[String],
    manager_id: i64,
) -> Result<usize, DatabaseError> {
    let mut deleted = 0;
    for chunk in patient_ids.chunks(ID_CHUNK) {
        let sql = format!(
            "DELETE FROM patients WHERE manager_id = ? AND patient_id IN ({})",
            placeholders(chunk.len())
        );
        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(chunk.len() + 1);
        bound.push(&manager_id);
        for id in chunk {
            bound.push(id);
        }
        deleted += conn.execute(&sql, bound.as_slice())?;
    }
    Ok(deleted)
}

pub fn count_patients(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(count)
}
