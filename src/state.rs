//! Process-wide injection root.
//!
//! Built once at startup from a validated key; every operation borrows the
//! cipher, guard and hasher from here and opens its own connection.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::authorization::{AccessGuard, ResolutionMode};
use crate::config::VaultConfig;
use crate::crypto::{FieldCipher, FieldKey, PasswordHasher};
use crate::db;
use crate::error::VaultError;

pub struct VaultState {
    db_path: PathBuf,
    cipher: FieldCipher,
    guard: AccessGuard,
    hasher: PasswordHasher,
}

impl VaultState {
    pub fn new(db_path: impl Into<PathBuf>, key: FieldKey) -> Self {
        Self {
            db_path: db_path.into(),
            cipher: FieldCipher::new(key),
            guard: AccessGuard::default(),
            hasher: PasswordHasher::default(),
        }
    }

    /// Build from `ENCRYPTION_KEY` / `CAREVAULT_DB` (and `.env`).
    pub fn from_env() -> Result<Self, VaultError> {
        let config = VaultConfig::from_env()?;
        Ok(Self::new(config.database_path, config.key))
    }

    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.guard = AccessGuard::new(mode);
        self
    }

    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Open a connection to the store, running migrations if needed.
    pub fn open_db(&self) -> Result<Connection, VaultError> {
        Ok(db::open_database(&self.db_path)?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }
}
