//! Listing parameters, strategy selection, and the shared
//! decrypt → filter → sort → page pipeline.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::config::DEFAULT_PAGE_LIMIT;
use crate::crypto::FieldCipher;
use crate::db::fold_compare;
use crate::models::{Patient, PatientRow, SortField};

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

/// Record listing request. Results are always ascending.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: SortField::PatientId,
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ListQuery {
    /// The search term, if any. An empty string means no search.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }
}

/// How a listing is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Store orders and pages by the plaintext identifier; only the page is decrypted.
    Fast,
    /// Every owned record is decrypted, then filtered, sorted and paged in memory.
    Secure,
}

impl QueryStrategy {
    pub fn select(query: &ListQuery) -> Self {
        if query.search_term().is_some() || query.sort_by.is_encrypted() {
            Self::Secure
        } else {
            Self::Fast
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Secure => "secure",
        }
    }
}

const SEARCHED_FIELDS: [SortField; 5] = [
    SortField::PatientId,
    SortField::FirstName,
    SortField::LastName,
    SortField::Dob,
    SortField::Gender,
];

/// Case-insensitive substring match on the identifier or any decrypted
/// field. Undecryptable fields never match.
pub fn matches_search(patient: &Patient, term: &str) -> bool {
    let needle = term.to_lowercase();
    SEARCHED_FIELDS
        .iter()
        .filter_map(|f| patient.field(*f))
        .any(|value| value.to_lowercase().contains(&needle))
}

/// Listing order: case-insensitive on `field`, ties broken by identifier.
/// Undecryptable values sort as the empty string.
pub fn compare_patients(a: &Patient, b: &Patient, field: SortField) -> Ordering {
    let by_id = || fold_compare(&a.patient_id, &b.patient_id);
    if !field.is_encrypted() {
        return by_id();
    }
    let key_a = a.field(field).unwrap_or("").to_lowercase();
    let key_b = b.field(field).unwrap_or("").to_lowercase();
    key_a.cmp(&key_b).then_with(by_id)
}

/// Decrypt every row, keep the matches, sort, then apply skip/limit.
pub fn decrypt_filter_sort_page(
    rows: Vec<PatientRow>,
    cipher: &FieldCipher,
    query: &ListQuery,
) -> Vec<Patient> {
    let mut patients: Vec<Patient> = rows
        .into_iter()
        .map(|row| Patient::decrypt(row, cipher))
        .collect();

    if let Some(term) = query.search_term() {
        patients.retain(|p| matches_search(p, term));
    }

    patients.sort_by(|a, b| compare_patients(a, b, query.sort_by));
    patients
        .into_iter()
        .skip(query.skip)
        .take(query.limit)
        .collect()
}
