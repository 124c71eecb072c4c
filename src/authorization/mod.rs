//! Role-based access control: permission resolution and the access guard.

pub mod guard;
pub mod resolver;

pub use guard::{require_ownership, AccessGuard, Operation, Policy};
pub use resolver::{Grants, ResolutionMode, RoleGraph};

/// Role name treated as superuser by every role and permission policy.
pub const ADMIN_ROLE: &str = "Admin";

/// Role name allowed to update or delete single records.
pub const MANAGER_ROLE: &str = "Manager";
