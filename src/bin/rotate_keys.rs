//! Offline key rotation. Stop the service before running.

use std::process::ExitCode;

use carevault::config::{self, KeyStore};
use carevault::{db, maintenance};

fn main() -> ExitCode {
    carevault::init_tracing();
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env file loaded: {e}");
    }

    let store = KeyStore::from_env();
    let db_path = config::database_path_from_env();
    tracing::info!(db = %db_path.display(), key_store = %store.path().display(), "Starting key rotation");

    let conn = match db::open_database(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "Cannot open store");
            return ExitCode::FAILURE;
        }
    };

    match maintenance::rotate_store(&conn, &store) {
        Ok(report) if report.committed => {
            println!(
                "Rotated {} of {} records ({} failed). New key written to {}",
                report.rotated,
                report.total,
                report.failed,
                store.path().display()
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            eprintln!(
                "No record could be rotated ({} failed). Key left unchanged.",
                report.failed
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Key rotation aborted");
            ExitCode::FAILURE
        }
    }
}
