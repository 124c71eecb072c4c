use std::path::{Path, PathBuf};

use regex::Regex;

use crate::crypto::FieldKey;
use crate::error::VaultError;

/// Application-level constants
pub const APP_NAME: &str = "CareVault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the base64 field-encryption key.
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";
/// Environment variable overriding the SQLite store location.
pub const DATABASE_PATH_VAR: &str = "CAREVAULT_DB";
/// Environment variable overriding the key file used by key rotation.
pub const KEY_FILE_VAR: &str = "CAREVAULT_KEY_FILE";
/// JSON list of initial accounts created by seeding.
pub const SEED_USERS_VAR: &str = "SEED_USERS";
/// Initial credential given to seeded accounts.
pub const SEED_PASSWORD_VAR: &str = "DEFAULT_USER_PASSWORD";

/// Failed logins before an account is locked.
pub const MAX_FAILED_LOGIN_ATTEMPTS: u32 = 3;
/// Cool-down applied once the failed-login threshold is reached.
pub const LOCKOUT_DURATION_MINUTES: i64 = 15;

/// Hard cap on audit events returned by a single admin query.
pub const AUDIT_QUERY_LIMIT: usize = 200;
/// Page size used when a listing request does not specify one.
pub const DEFAULT_PAGE_LIMIT: usize = 100;
/// How many colliding identifiers an ingest rejection reports.
pub const DUPLICATE_REPORT_LIMIT: usize = 5;

/// Get the application data directory
/// ~/CareVault/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Default location of the record store.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("carevault.db")
}

/// Default `.env`-style file the key lives in.
pub fn default_key_file() -> PathBuf {
    PathBuf::from(".env")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "carevault=info,warn"
}

/// Startup configuration: where the store lives and which key protects it.
pub struct VaultConfig {
    pub database_path: PathBuf,
    pub key: FieldKey,
}

impl VaultConfig {
    /// Load from the process environment, after merging a `.env` file if one
    /// exists in the working directory. A missing or malformed key is fatal.
    pub fn from_env() -> Result<Self, VaultError> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env file loaded: {e}");
        }

        let encoded = std::env::var(ENCRYPTION_KEY_VAR)
            .map_err(|_| VaultError::Config(format!("{ENCRYPTION_KEY_VAR} must be set")))?;
        let key = FieldKey::from_base64(encoded.trim())
            .map_err(|e| VaultError::Config(format!("invalid {ENCRYPTION_KEY_VAR}: {e}")))?;

        Ok(Self {
            database_path: database_path_from_env(),
            key,
        })
    }
}

/// Store path named by `CAREVAULT_DB`, else the per-user default.
pub fn database_path_from_env() -> PathBuf {
    std::env::var(DATABASE_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_database_path())
}

// ═══════════════════════════════════════════════════════════
// Key store (.env file)
// ═══════════════════════════════════════════════════════════

/// Durable home of the active encryption key: a `.env`-style file.
///
/// Only key rotation writes to it; the live service reads the key once at
/// startup through [`VaultConfig::from_env`].
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Key file named by `CAREVAULT_KEY_FILE`, else `./.env`.
    pub fn from_env() -> Self {
        let path = std::env::var(KEY_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_key_file());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the key from the file. `Ok(None)` when the file or entry is absent.
    pub fn load(&self) -> Result<Option<FieldKey>, VaultError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let entries = dotenv::from_path_iter(&self.path)
            .map_err(|e| VaultError::Config(format!("cannot read {}: {e}", self.path.display())))?;

        for entry in entries {
            let (name, value) = entry
                .map_err(|e| VaultError::Config(format!("malformed {}: {e}", self.path.display())))?;
            if name == ENCRYPTION_KEY_VAR {
                let key = FieldKey::from_base64(value.trim())
                    .map_err(|e| VaultError::Config(format!("invalid {ENCRYPTION_KEY_VAR}: {e}")))?;
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Write `key` into the file, replacing an existing entry or appending one.
    /// Other lines are preserved.
    pub fn store(&self, key: &FieldKey) -> Result<(), VaultError> {
        let content = if self.path.exists() {
            std::fs::read_to_string(&self.path)
                .map_err(|e| VaultError::Config(format!("cannot read {}: {e}", self.path.display())))?
        } else {
            String::new()
        };

        let line = format!("{ENCRYPTION_KEY_VAR}={}", key.to_base64());
        let pattern = Regex::new(&format!(r"(?m)^{ENCRYPTION_KEY_VAR}=.*$"))
            .map_err(|e| VaultError::Config(e.to_string()))?;

        let updated = if pattern.is_match(&content) {
            pattern.replace_all(&content, line.as_str()).into_owned()
        } else if content.is_empty() || content.ends_with('\n') {
            format!("{content}{line}\n")
        } else {
            format!("{content}\n{line}\n")
        };

        std::fs::write(&self.path, updated)
            .map_err(|e| VaultError::Config(format!("cannot write {}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), "Encryption key written to key store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("CareVault"));
    }

    #[test]
    fn database_under_app_data() {
        assert!(default_database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn key_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("absent.env"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn key_store_appends_then_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "OTHER=1").unwrap();
        let store = KeyStore::new(&path);

        let first = FieldKey::generate();
        store.store(&first).unwrap();
        assert_eq!(store.load().unwrap().unwrap().to_base64(), first.to_base64());

        let second = FieldKey::generate();
        store.store(&second).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(ENCRYPTION_KEY_VAR).count(), 1);
        assert!(content.contains("OTHER=1"));
        assert_eq!(store.load().unwrap().unwrap().to_base64(), second.to_base64());
    }

    #[test]
    fn key_store_rejects_malformed_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ENCRYPTION_KEY=not-a-key\n").unwrap();
        assert!(KeyStore::new(&path).load().is_err());
    }
}
