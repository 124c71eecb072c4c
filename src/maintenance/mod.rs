//! Offline maintenance tasks. Not reachable from the live operations.

pub mod key_rotation;

pub use key_rotation::{rotate_records, rotate_store, RotationReport};
