pub mod accounts;
pub mod admin;
pub mod audit;
pub mod authorization;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod maintenance; // offline key rotation
pub mod models;
pub mod patients;
pub mod seed;
pub mod state;

pub use authorization::{AccessGuard, Operation, ResolutionMode};
pub use crypto::{FieldCipher, FieldKey, PasswordHasher};
pub use error::VaultError;
pub use state::VaultState;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
