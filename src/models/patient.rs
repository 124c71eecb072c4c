use serde::{Deserialize, Serialize};

use crate::crypto::{Decrypted, FieldCipher};
use crate::models::enums::SortField;

/// A patient row exactly as stored: plaintext key, ciphertext fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRow {
    pub id: i64,
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub gender: String,
    pub manager_id: i64,
}

/// A patient with every sensitive field decrypted (or flagged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub id: i64,
    pub patient_id: String,
    pub first_name: Decrypted,
    pub last_name: Decrypted,
    pub dob: Decrypted,
    pub gender: Decrypted,
    pub manager_id: i64,
}

impl Patient {
    /// Decrypt all four fields of a stored row. Never fails; bad fields are flagged.
    pub fn decrypt(row: PatientRow, cipher: &FieldCipher) -> Self {
        Self {
            first_name: cipher.decrypt(&row.first_name),
            last_name: cipher.decrypt(&row.last_name),
            dob: cipher.decrypt(&row.dob),
            gender: cipher.decrypt(&row.gender),
            id: row.id,
            patient_id: row.patient_id,
            manager_id: row.manager_id,
        }
    }

    /// Text for a listing column. `None` for an undecryptable field.
    pub fn field(&self, field: SortField) -> Option<&str> {
        match field {
            SortField::PatientId => Some(&self.patient_id),
            SortField::FirstName => self.first_name.as_plain(),
            SortField::LastName => self.last_name.as_plain(),
            SortField::Dob => self.dob.as_plain(),
            SortField::Gender => self.gender.as_plain(),
        }
    }

    pub fn has_undecryptable_field(&self) -> bool {
        [&self.first_name, &self.last_name, &self.dob, &self.gender]
            .iter()
            .any(|f| f.is_undecryptable())
    }
}

/// A plaintext patient as supplied by ingest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPatient {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub gender: String,
}

/// Partial update of the sensitive fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.dob.is_none()
            && self.gender.is_none()
    }
}
