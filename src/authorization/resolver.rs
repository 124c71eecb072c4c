//! Permission resolution: Role → effective grant set.
//!
//! Default resolution reads only the role's own grants. The parent link is
//! kept in a separate [`RoleGraph`] so inheritance is a pure function over
//! the graph, selected by [`ResolutionMode`].

use std::collections::{BTreeSet, HashMap, HashSet};

use rusqlite::Connection;

use super::ADMIN_ROLE;
use crate::db::{repository, DatabaseError};
use crate::models::Role;

/// How a role's effective permissions are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Only the role's own grants count.
    #[default]
    DirectGrants,
    /// The role's grants plus those of every ancestor.
    InheritFromParents,
}

/// Effective authority of one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grants {
    admin: bool,
    permissions: BTreeSet<String>,
}

impl Grants {
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// Admin, or at least one of `required` is granted. An empty `required`
    /// set passes only for Admin.
    pub fn has_any(&self, required: &[&str]) -> bool {
        self.admin || required.iter().any(|p| self.permissions.contains(*p))
    }
}

/// Parent links of the whole role forest, keyed by role id.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<i64, Role>,
}

impl RoleGraph {
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn load(conn: &Connection) -> Result<Self, DatabaseError> {
        Ok(Self::from_roles(repository::list_roles(conn)?))
    }

    pub fn role(&self, id: i64) -> Option<&Role> {
        self.roles.get(&id)
    }

    /// Ancestors of `role_id`, nearest first. Stops at a missing parent or
    /// at the first repeated id, so a cyclic forest still terminates.
    pub fn ancestors(&self, role_id: i64) -> Vec<i64> {
        let mut seen = HashSet::from([role_id]);
        let mut chain = Vec::new();
        let mut current = self.roles.get(&role_id).and_then(|r| r.parent_id);
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            chain.push(id);
            current = self.roles.get(&id).and_then(|r| r.parent_id);
        }
        chain
    }
}

pub fn is_admin(role: &Role) -> bool {
    role.name == ADMIN_ROLE
}

/// Direct grants only.
pub fn resolve_direct(role: &Role) -> Grants {
    Grants {
        admin: is_admin(role),
        permissions: role.permissions.iter().cloned().collect(),
    }
}

/// Direct grants plus every ancestor's grants from `graph`.
pub fn resolve_inherited(role: &Role, graph: &RoleGraph) -> Grants {
    let mut grants = resolve_direct(role);
    for ancestor in graph.ancestors(role.id) {
        if let Some(parent) = graph.role(ancestor) {
            grants.permissions.extend(parent.permissions.iter().cloned());
        }
    }
    grants
}

/// Resolve under `mode`. Only inheritance touches the store.
pub fn resolve(conn: &Connection, role: &Role, mode: ResolutionMode) -> Result<Grants, DatabaseError> {
    match mode {
        ResolutionMode::DirectGrants => Ok(resolve_direct(role)),
        ResolutionMode::InheritFromParents => Ok(resolve_inherited(role, &RoleGraph::load(conn)?)),
    }
}
