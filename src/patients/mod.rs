//! Record access engine: listing, mutation, bulk ingest, statistics.
//!
//! Sensitive fields are ciphertext at rest. Listing picks a strategy per
//! request (see [`query::QueryStrategy`]); every path is owner-scoped.

pub mod engine;
pub mod ingest;
pub mod mutate;
pub mod query;
pub mod stats;

pub use engine::list_patients;
pub use ingest::{ingest_patients, IngestBatch, REQUIRED_COLUMNS};
pub use mutate::{bulk_delete_patients, delete_patient, update_patient};
pub use query::{ListQuery, QueryStrategy};
pub use stats::{patient_statistics, patient_statistics_on, AgeGroups, GenderDistribution, PatientStatistics};

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rusqlite::Connection;

    use super::*;
    use crate::authorization::AccessGuard;
    use crate::crypto::{FieldCipher, FieldKey};
    use crate::db::repository::{self, count_audit_events, get_principal, tests_support::seed_owner};
    use crate::db::sqlite::open_memory_database;
    use crate::error::VaultError;
    use crate::models::{AuditAction, PatientUpdate, Principal, SortField};

    struct Fixture {
        conn: Connection,
        guard: AccessGuard,
        cipher: FieldCipher,
        owner_a: Principal,
        owner_b: Principal,
    }

    fn fixture() -> Fixture {
        let conn = open_memory_database().unwrap();
        let a = seed_owner(&conn, "a@example.org");
        let b = seed_owner(&conn, "b@example.org");
        Fixture {
            owner_a: get_principal(&conn, a).unwrap().unwrap(),
            owner_b: get_principal(&conn, b).unwrap().unwrap(),
            conn,
            guard: AccessGuard::default(),
            cipher: FieldCipher::new(FieldKey::generate()),
        }
    }

    fn batch(rows: &[[&str; 5]]) -> IngestBatch {
        IngestBatch::new(
            REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    fn ids(patients: &[crate::models::Patient]) -> Vec<String> {
        patients.iter().map(|p| p.patient_id.clone()).collect()
    }

    fn list(f: &Fixture, who: &Principal, query: &ListQuery) -> Vec<crate::models::Patient> {
        list_patients(&f.conn, &f.guard, &f.cipher, who, query).unwrap()
    }

    // ── End-to-end ────────────────────────────────────────────

    #[test]
    fn ingest_list_delete_scenario() {
        let f = fixture();
        let n = ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &f.owner_a,
            batch(&[
                ["P2", "Jane", "Roe", "1985-03-04", "Female"],
                ["P1", "John", "Doe", "1990-01-01", "Male"],
            ]),
        )
        .unwrap();
        assert_eq!(n, 2);

        assert_eq!(ids(&list(&f, &f.owner_a, &ListQuery::default())), vec!["P1", "P2"]);
        assert!(list(&f, &f.owner_b, &ListQuery::default()).is_empty());

        delete_patient(&f.conn, &f.guard, &f.owner_a, "P1").unwrap();
        assert_eq!(ids(&list(&f, &f.owner_a, &ListQuery::default())), vec!["P2"]);
    }

    #[test]
    fn fields_are_ciphertext_at_rest() {
        let f = fixture();
        ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &f.owner_a,
            batch(&[["P1", "John", "Doe", "1990-01-01", "Male"]]),
        )
        .unwrap();
        let row = repository::find_patient(&f.conn, "P1").unwrap().unwrap();
        assert_ne!(row.first_name, "John");
        assert_ne!(row.gender, "Male");
        assert_eq!(f.cipher.decrypt(&row.last_name).as_plain(), Some("Doe"));
    }

    // ── Listing ───────────────────────────────────────────────

    #[test]
    fn listing_writes_two_audit_events_on_both_paths() {
        let f = fixture();
        list(&f, &f.owner_a, &ListQuery::default());
        list(&f, &f.owner_a, &ListQuery { search: Some("x".into()), ..Default::default() });

        let who = Some(f.owner_a.id);
        assert_eq!(count_audit_events(&f.conn, AuditAction::AccessPatients, who).unwrap(), 2);
        assert_eq!(count_audit_events(&f.conn, AuditAction::DecryptionOperation, who).unwrap(), 2);
    }

    #[test]
    fn search_never_crosses_owners() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["A1", "Sam", "Lee", "", "Male"]])).unwrap();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_b, batch(&[["B1", "Sam", "Lee", "", "Male"]])).unwrap();

        for sort_by in [SortField::PatientId, SortField::FirstName] {
            let query = ListQuery { search: Some("sam".into()), sort_by, ..Default::default() };
            assert_eq!(ids(&list(&f, &f.owner_a, &query)), vec!["A1"]);
            assert_eq!(ids(&list(&f, &f.owner_b, &query)), vec!["B1"]);
        }
    }

    #[test]
    fn sort_by_encrypted_field() {
        let f = fixture();
        ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &f.owner_a,
            batch(&[
                ["P1", "carol", "x", "", ""],
                ["P2", "Alice", "x", "", ""],
                ["P3", "bob", "x", "", ""],
            ]),
        )
        .unwrap();
        let query = ListQuery { sort_by: SortField::FirstName, ..Default::default() };
        assert_eq!(ids(&list(&f, &f.owner_a, &query)), vec!["P2", "P3", "P1"]);
    }

    #[test]
    fn listing_flags_undecryptable_rows_instead_of_failing() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["P1", "John", "Doe", "", ""]])).unwrap();
        let foreign = FieldCipher::new(FieldKey::generate());
        let listed = list_patients(&f.conn, &f.guard, &foreign, &f.owner_a, &ListQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].first_name.is_undecryptable());
        assert_eq!(listed[0].gender.as_plain(), Some(""));
    }

    // ── Ingest ────────────────────────────────────────────────

    #[test]
    fn ingest_with_one_stored_duplicate_persists_nothing() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_b, batch(&[["P3", "a", "b", "", ""]])).unwrap();

        let err = ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &f.owner_a,
            batch(&[["P1", "a", "b", "", ""], ["P2", "a", "b", "", ""], ["P3", "a", "b", "", ""]]),
        )
        .unwrap_err();
        match err {
            VaultError::DuplicatePatients { colliding } => assert_eq!(colliding, vec!["P3".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 1);
        assert_eq!(count_audit_events(&f.conn, AuditAction::UploadPatients, Some(f.owner_a.id)).unwrap(), 0);
    }

    #[test]
    fn ingest_with_repeat_inside_batch_persists_nothing() {
        let f = fixture();
        let err = ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &f.owner_a,
            batch(&[["P1", "a", "b", "", ""], ["P1", "c", "d", "", ""]]),
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::DuplicatePatients { ref colliding } if colliding == &["P1".to_string()]));
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 0);
    }

    #[test]
    fn ingest_audits_count_and_encryption() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["P1", "a", "b", "", ""]])).unwrap();
        let who = Some(f.owner_a.id);
        assert_eq!(count_audit_events(&f.conn, AuditAction::UploadPatients, who).unwrap(), 1);
        assert_eq!(count_audit_events(&f.conn, AuditAction::EncryptionOperation, who).unwrap(), 1);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let f = fixture();
        let err = ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[])).unwrap_err();
        assert!(matches!(err, VaultError::ValidationFailed(_)));
    }

    // ── Mutation ──────────────────────────────────────────────

    #[test]
    fn update_reencrypts_only_supplied_fields() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["P1", "John", "Doe", "1990-01-01", "Male"]])).unwrap();
        let before = repository::find_patient(&f.conn, "P1").unwrap().unwrap();

        let update = PatientUpdate { last_name: Some("Smith".into()), ..Default::default() };
        let updated = update_patient(&f.conn, &f.guard, &f.cipher, &f.owner_a, "P1", &update).unwrap();
        assert_eq!(updated.last_name.as_plain(), Some("Smith"));
        assert_eq!(updated.first_name.as_plain(), Some("John"));

        let after = repository::find_patient(&f.conn, "P1").unwrap().unwrap();
        assert_eq!(after.first_name, before.first_name);
        assert_ne!(after.last_name, before.last_name);
        assert_eq!(count_audit_events(&f.conn, AuditAction::UpdatePatient, None).unwrap(), 1);
    }

    #[test]
    fn foreign_and_missing_records_look_the_same() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_b, batch(&[["P1", "a", "b", "", ""]])).unwrap();

        let foreign = delete_patient(&f.conn, &f.guard, &f.owner_a, "P1").unwrap_err();
        let missing = delete_patient(&f.conn, &f.guard, &f.owner_a, "nope").unwrap_err();
        assert_eq!(foreign.code(), "NOT_FOUND");
        assert_eq!(foreign.to_string(), missing.to_string());
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 1);
    }

    #[test]
    fn bulk_delete_counts_owned_rows_only() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["A1", "", "", "", ""], ["A2", "", "", "", ""]])).unwrap();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_b, batch(&[["B1", "", "", "", ""]])).unwrap();

        let ids = vec!["A1".to_string(), "B1".into(), "ZZ".into()];
        assert_eq!(bulk_delete_patients(&f.conn, &f.guard, &f.owner_a, &ids).unwrap(), 1);
        assert_eq!(count_audit_events(&f.conn, AuditAction::BulkDelete, None).unwrap(), 1);

        let none = vec!["B1".to_string()];
        assert_eq!(bulk_delete_patients(&f.conn, &f.guard, &f.owner_a, &none).unwrap(), 0);
        assert_eq!(count_audit_events(&f.conn, AuditAction::BulkDelete, None).unwrap(), 1);
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 2);
    }

    #[test]
    fn bulk_delete_of_nothing_is_a_no_op() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["A1", "", "", "", ""]])).unwrap();

        assert_eq!(bulk_delete_patients(&f.conn, &f.guard, &f.owner_a, &[]).unwrap(), 0);
        assert_eq!(count_audit_events(&f.conn, AuditAction::BulkDelete, None).unwrap(), 0);
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 1);
    }

    #[test]
    fn user_role_cannot_mutate_single_records() {
        let f = fixture();
        let catalogue = repository::tests_support::seed_catalogue(&f.conn);
        repository::update_assignment(
            &f.conn,
            f.owner_a.id,
            &crate::models::UserAssignment { role_id: Some(catalogue.user_role), ..Default::default() },
        )
        .unwrap();
        let demoted = get_principal(&f.conn, f.owner_a.id).unwrap().unwrap();

        let err = delete_patient(&f.conn, &f.guard, &demoted, "P1").unwrap_err();
        assert!(matches!(err, VaultError::Forbidden { .. }));
        let err = ingest_patients(&f.conn, &f.guard, &f.cipher, &demoted, batch(&[["P1", "", "", "", ""]])).unwrap_err();
        assert!(matches!(err, VaultError::Forbidden { .. }));
        assert_eq!(repository::count_patients(&f.conn).unwrap(), 0);
    }

    // ── Statistics ────────────────────────────────────────────

    #[test]
    fn statistics_skip_undecryptable_rows() {
        let f = fixture();
        let view = repository::upsert_permission(&f.conn, "report.view", None).unwrap();
        let manager = repository::get_role_by_name(&f.conn, "Manager").unwrap().unwrap();
        let mut grants: Vec<i64> = manager
            .permissions
            .iter()
            .filter_map(|p| repository::get_permission_by_name(&f.conn, p).unwrap().map(|p| p.id))
            .collect();
        grants.push(view);
        repository::replace_role_permissions(&f.conn, manager.id, &grants).unwrap();
        let owner = get_principal(&f.conn, f.owner_a.id).unwrap().unwrap();

        ingest_patients(
            &f.conn,
            &f.guard,
            &f.cipher,
            &owner,
            batch(&[
                ["P1", "a", "b", "2000-06-01", "Male"],
                ["P2", "a", "b", "1950-06-01", "Female"],
                ["P3", "a", "b", "1990-06-01", "Female"],
            ]),
        )
        .unwrap();
        let mut broken = repository::find_patient(&f.conn, "P3").unwrap().unwrap();
        broken.gender = "corrupted".into();
        repository::update_patient_ciphertext(&f.conn, &broken).unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let stats = patient_statistics_on(&f.conn, &f.guard, &f.cipher, &owner, today).unwrap();
        assert_eq!(stats.total_patients, 3);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.gender_distribution.male_percentage, 33);
        assert_eq!(stats.gender_distribution.female_percentage, 33);
        assert_eq!(stats.age_groups.from_19_to_35, 1);
        assert_eq!(stats.age_groups.over_70, 1);
        assert_eq!(count_audit_events(&f.conn, AuditAction::ViewStats, Some(owner.id)).unwrap(), 1);
    }

    #[test]
    fn statistics_require_report_permission() {
        let f = fixture();
        let err = patient_statistics(&f.conn, &f.guard, &f.cipher, &f.owner_a).unwrap_err();
        assert!(matches!(err, VaultError::Forbidden { .. }));
    }

    // ── Fast path ≡ secure path ──────────────────────────────

    fn secure_reference(f: &Fixture, skip: usize, limit: usize) -> Vec<String> {
        let rows = repository::list_owned_patients(&f.conn, f.owner_a.id).unwrap();
        let query = ListQuery { skip, limit, ..Default::default() };
        ids(&query::decrypt_filter_sort_page(rows, &f.cipher, &query))
    }

    #[test]
    fn skip_past_i64_range_is_empty_on_both_paths() {
        let f = fixture();
        ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&[["P1", "Ann", "Lee", "", ""]])).unwrap();

        let by_id = ListQuery { skip: usize::MAX, ..Default::default() };
        let by_name = ListQuery { skip: usize::MAX, sort_by: SortField::FirstName, ..Default::default() };
        assert_eq!(QueryStrategy::select(&by_id), QueryStrategy::Fast);
        assert_eq!(QueryStrategy::select(&by_name), QueryStrategy::Secure);
        assert!(list(&f, &f.owner_a, &by_id).is_empty());
        assert!(list(&f, &f.owner_a, &by_name).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn fast_path_matches_secure_path(
            raw_ids in proptest::collection::hash_set("[a-zA-Z0-9]{1,6}", 0..20),
            skip in prop_oneof![0usize..25, Just(usize::MAX), (i64::MAX as usize)..=usize::MAX],
            limit in prop_oneof![0usize..25, Just(usize::MAX)],
        ) {
            let f = fixture();
            let rows: Vec<[String; 5]> = raw_ids
                .into_iter()
                .map(|id| [id, "n".into(), "m".into(), String::new(), String::new()])
                .collect();
            if !rows.is_empty() {
                let refs: Vec<[&str; 5]> = rows
                    .iter()
                    .map(|r| [r[0].as_str(), r[1].as_str(), r[2].as_str(), r[3].as_str(), r[4].as_str()])
                    .collect();
                ingest_patients(&f.conn, &f.guard, &f.cipher, &f.owner_a, batch(&refs)).unwrap();
            }

            let query = ListQuery { skip, limit, ..Default::default() };
            prop_assert_eq!(QueryStrategy::select(&query), QueryStrategy::Fast);
            let fast = ids(&list(&f, &f.owner_a, &query));
            prop_assert_eq!(fast, secure_reference(&f, skip, limit));
        }
    }
}
