//! Repository layer: entity-scoped database operations.
//!
//! Free functions over `&Connection`, so callers can pass either a plain
//! connection or an open transaction.

mod audit;
mod directory;
mod patient;
mod role;
mod user;

pub use audit::*;
pub use directory::*;
pub use patient::*;
pub use role::*;
pub use user::*;
