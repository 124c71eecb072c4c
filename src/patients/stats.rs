//! Store-wide report: totals, gender split, age buckets.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::audit;
use crate::authorization::{AccessGuard, Operation};
use crate::crypto::FieldCipher;
use crate::db::repository;
use crate::error::VaultError;
use crate::models::{AuditAction, Principal};

const DOB_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenderDistribution {
    pub male_percentage: u32,
    pub female_percentage: u32,
}

/// Patient counts per age bucket, by calendar year difference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgeGroups {
    #[serde(rename = "0-18")]
    pub up_to_18: u32,
    #[serde(rename = "19-35")]
    pub from_19_to_35: u32,
    #[serde(rename = "36-50")]
    pub from_36_to_50: u32,
    #[serde(rename = "51-70")]
    pub from_51_to_70: u32,
    #[serde(rename = "70+")]
    pub over_70: u32,
}

impl AgeGroups {
    fn add(&mut self, age: i32) {
        match age {
            i32::MIN..=18 => self.up_to_18 += 1,
            19..=35 => self.from_19_to_35 += 1,
            36..=50 => self.from_36_to_50 += 1,
            51..=70 => self.from_51_to_70 += 1,
            _ => self.over_70 += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatientStatistics {
    pub total_patients: i64,
    pub total_users: i64,
    pub gender_distribution: GenderDistribution,
    pub age_groups: AgeGroups,
}

/// Parse a decrypted date of birth. Any time part is ignored.
pub fn parse_dob(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let date_part = value.split(' ').next().unwrap_or(value);
    DOB_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(date_part, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(value, fmt).ok().map(|dt| dt.date()))
    })
}

fn percentage(part: u32, total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    (f64::from(part) / total as f64 * 100.0).round_ties_even() as u32
}

pub fn patient_statistics(
    conn: &Connection,
    guard: &AccessGuard,
    cipher: &FieldCipher,
    principal: &Principal,
) -> Result<PatientStatistics, VaultError> {
    patient_statistics_on(conn, guard, cipher, principal, Utc::now().date_naive())
}

/// Statistics with ages computed against `today`'s year.
///
/// Percentages are over every stored record, so undecryptable rows still
/// count toward the total but never toward a bucket.
pub fn patient_statistics_on(
    conn: &Connection,
    guard: &AccessGuard,
    cipher: &FieldCipher,
    principal: &Principal,
    today: NaiveDate,
) -> Result<PatientStatistics, VaultError> {
    guard.authorize(conn, principal, Operation::ViewStatistics)?;

    let tx = conn.unchecked_transaction()?;
    let total_patients = repository::count_patients(&tx)?;
    let total_users = repository::count_users(&tx)?;

    let mut male = 0u32;
    let mut female = 0u32;
    let mut skipped = 0usize;
    let mut age_groups = AgeGroups::default();

    for row in repository::list_all_patients(&tx)? {
        let gender = cipher.decrypt(&row.gender);
        let dob = cipher.decrypt(&row.dob);
        if gender.is_undecryptable() || dob.is_undecryptable() {
            skipped += 1;
            continue;
        }

        match gender.as_plain() {
            Some("Male") => male += 1,
            Some("Female") => female += 1,
            _ => {}
        }
        if let Some(born) = dob.as_plain().and_then(parse_dob) {
            age_groups.add(today.year() - born.year());
        }
    }

    audit::record(&tx, Some(principal.id), AuditAction::ViewStats, Some("Viewed patient statistics"))?;
    tx.commit()?;

    if skipped > 0 {
        tracing::warn!(skipped, "Statistics skipped undecryptable records");
    }
    tracing::info!(user_id = principal.id, total_patients, "Statistics computed");

    Ok(PatientStatistics {
        total_patients,
        total_users,
        gender_distribution: GenderDistribution {
            male_percentage: percentage(male, total_patients),
            female_percentage: percentage(female, total_patients),
        },
        age_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_formats() {
        let expected = NaiveDate::from_ymd_opt(1980, 5, 17).unwrap();
        assert_eq!(parse_dob("1980-05-17"), Some(expected));
        assert_eq!(parse_dob("1980-05-17 08:30:00"), Some(expected));
        assert_eq!(parse_dob("05/17/1980"), Some(expected));
        assert_eq!(parse_dob("17.05.1980"), None);
        assert_eq!(parse_dob(""), None);
    }

    #[test]
    fn age_buckets_are_inclusive_upper_bounds() {
        let mut groups = AgeGroups::default();
        for age in [0, 18, 19, 35, 36, 50, 51, 70, 71] {
            groups.add(age);
        }
        assert_eq!(
            groups,
            AgeGroups {
                up_to_18: 2,
                from_19_to_35: 2,
                from_36_to_50: 2,
                from_51_to_70: 2,
                over_70: 1,
            }
        );
    }

    #[test]
    fn percentages_round_and_handle_empty() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(0, 0), 0);
        // Halves go to the even neighbour.
        assert_eq!(percentage(1, 8), 12);
        assert_eq!(percentage(3, 8), 38);
        assert_eq!(percentage(1, 200), 0);
    }

    #[test]
    fn age_groups_serialize_with_bucket_labels() {
        let json = serde_json::to_value(AgeGroups { over_70: 4, ..Default::default() }).unwrap();
        assert_eq!(json["70+"], 4);
        assert_eq!(json["0-18"], 0);
    }
}
