//! Idempotent seeding of the default catalogue and optional initial accounts.

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{SEED_PASSWORD_VAR, SEED_USERS_VAR};
use crate::crypto::PasswordHasher;
use crate::db::{repository, DatabaseError};
use crate::error::VaultError;
use crate::models::NewUser;

pub const DEFAULT_PERMISSIONS: [&str; 10] = [
    "user.create",
    "user.read",
    "user.update",
    "user.delete",
    "patient.create",
    "patient.read",
    "patient.update",
    "patient.delete",
    "audit.view",
    "report.view",
];

/// (role, parent, direct grants)
const DEFAULT_ROLES: [(&str, Option<&str>, &[&str]); 4] = [
    (
        "Admin",
        None,
        &["user.create", "user.read", "user.update", "user.delete", "audit.view", "report.view"],
    ),
    (
        "Manager",
        Some("Admin"),
        &["patient.create", "patient.read", "patient.update", "patient.delete"],
    ),
    ("User", Some("Manager"), &["patient.read"]),
    ("Finance", None, &[]),
];

pub const DEFAULT_LOCATIONS: [&str; 4] = ["US", "IN", "EU", "AU"];
pub const DEFAULT_TEAMS: [&str; 3] = ["AR", "EPA", "PRI"];

/// One initial account. Location and team default to the first seeded ones.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub role: String,
    #[serde(default, alias = "loc")]
    pub location: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// Seed users from `SEED_USERS` (JSON). Invalid JSON yields none.
pub fn seed_users_from_env() -> Vec<SeedUser> {
    let Ok(raw) = std::env::var(SEED_USERS_VAR) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid seed account list, skipping account seeding");
            Vec::new()
        }
    }
}

pub fn seed_password_from_env() -> Option<String> {
    std::env::var(SEED_PASSWORD_VAR).ok().filter(|p| !p.is_empty())
}

fn id_of_location(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    match repository::get_location_by_name(conn, name)? {
        Some(location) => Ok(location.id),
        None => repository::insert_location(conn, name),
    }
}

fn id_of_team(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    match repository::get_team_by_name(conn, name)? {
        Some(team) => Ok(team.id),
        None => repository::insert_team(conn, name),
    }
}

fn id_of_role(conn: &Connection, name: &str) -> Result<i64, DatabaseError> {
    match repository::get_role_by_name(conn, name)? {
        Some(role) => Ok(role.id),
        None => repository::insert_role(conn, name, None),
    }
}

/// Create the default permissions, roles, locations and teams. Existing
/// entries are kept; default roles get their default parent and grants.
pub fn seed_catalogue(conn: &Connection) -> Result<(), VaultError> {
    let tx = conn.unchecked_transaction()?;

    for name in DEFAULT_PERMISSIONS {
        repository::upsert_permission(&tx, name, Some(&format!("Ability to {name}")))?;
    }

    for (name, _, _) in DEFAULT_ROLES {
        id_of_role(&tx, name)?;
    }
    for (name, parent, grants) in DEFAULT_ROLES {
        let role_id = id_of_role(&tx, name)?;
        let parent_id = parent.map(|p| id_of_role(&tx, p)).transpose()?;
        repository::set_role_parent(&tx, role_id, parent_id)?;

        let mut permission_ids = Vec::with_capacity(grants.len());
        for grant in grants {
            permission_ids.push(repository::upsert_permission(&tx, grant, None)?);
        }
        repository::replace_role_permissions(&tx, role_id, &permission_ids)?;
    }

    for name in DEFAULT_LOCATIONS {
        id_of_location(&tx, name)?;
    }
    for name in DEFAULT_TEAMS {
        id_of_team(&tx, name)?;
    }

    tx.commit()?;
    tracing::info!(
        permissions = DEFAULT_PERMISSIONS.len(),
        roles = DEFAULT_ROLES.len(),
        "Default catalogue seeded"
    );
    Ok(())
}

/// Create missing seed accounts. Accounts that already exist or name an
/// unknown role are skipped. Returns how many were created.
pub fn seed_users(
    conn: &Connection,
    hasher: &PasswordHasher,
    users: &[SeedUser],
    initial_password: &str,
) -> Result<usize, VaultError> {
    if initial_password.is_empty() {
        if !users.is_empty() {
            tracing::warn!("No initial credential configured, skipping account seeding");
        }
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let mut created = 0;
    for (n, user) in users.iter().enumerate() {
        let Some(role) = repository::get_role_by_name(&tx, &user.role)? else {
            tracing::warn!(entry = n, "Seed account names an unknown role, skipped");
            continue;
        };
        if repository::email_in_use(&tx, &user.email, None)? {
            continue;
        }

        let location = user.location.as_deref().unwrap_or(DEFAULT_LOCATIONS[0]);
        let team = user.team.as_deref().unwrap_or(DEFAULT_TEAMS[0]);
        let location_id = match repository::get_location_by_name(&tx, location)? {
            Some(l) => l.id,
            None => id_of_location(&tx, DEFAULT_LOCATIONS[0])?,
        };
        let team_id = match repository::get_team_by_name(&tx, team)? {
            Some(t) => t.id,
            None => id_of_team(&tx, DEFAULT_TEAMS[0])?,
        };

        let new_user = NewUser {
            email: user.email.clone(),
            password: String::new(),
            role_id: role.id,
            location_id,
            team_id,
            full_name: None,
            phone_number: None,
        };
        repository::insert_user(&tx, &new_user, &hasher.hash(initial_password)?)?;
        created += 1;
    }
    tx.commit()?;

    tracing::info!(created, "Seed accounts created");
    Ok(created)
}

/// Seed the catalogue, then the accounts listed in `SEED_USERS` with the
/// password from `DEFAULT_USER_PASSWORD`. Returns how many accounts were created.
pub fn seed_from_env(conn: &Connection, hasher: &PasswordHasher) -> Result<usize, VaultError> {
    seed_catalogue(conn)?;
    let users = seed_users_from_env();
    let password = seed_password_from_env().unwrap_or_default();
    seed_users(conn, hasher, &users, &password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn catalogue_matches_defaults() {
        let conn = open_memory_database().unwrap();
        seed_catalogue(&conn).unwrap();

        assert_eq!(repository::list_permissions(&conn).unwrap().len(), 10);
        assert_eq!(repository::list_locations(&conn).unwrap().len(), 4);
        assert_eq!(repository::list_teams(&conn).unwrap().len(), 3);

        let admin = repository::get_role_by_name(&conn, "Admin").unwrap().unwrap();
        let manager = repository::get_role_by_name(&conn, "Manager").unwrap().unwrap();
        let user = repository::get_role_by_name(&conn, "User").unwrap().unwrap();
        let finance = repository::get_role_by_name(&conn, "Finance").unwrap().unwrap();

        assert!(!admin.permissions.iter().any(|p| p.starts_with("patient.")));
        assert_eq!(manager.parent_id, Some(admin.id));
        assert_eq!(manager.permissions.len(), 4);
        assert_eq!(user.parent_id, Some(manager.id));
        assert_eq!(user.permissions, vec!["patient.read".to_string()]);
        assert!(finance.permissions.is_empty());
        assert_eq!(finance.parent_id, None);
    }

    #[test]
    fn seeding_twice_changes_nothing() {
        let conn = open_memory_database().unwrap();
        seed_catalogue(&conn).unwrap();
        seed_catalogue(&conn).unwrap();
        assert_eq!(repository::list_roles(&conn).unwrap().len(), 4);
        assert_eq!(repository::list_permissions(&conn).unwrap().len(), 10);
    }

    #[test]
    fn seed_users_skip_existing_and_unknown_roles() {
        let conn = open_memory_database().unwrap();
        seed_catalogue(&conn).unwrap();
        let users: Vec<SeedUser> = serde_json::from_str(
            r#"[
                {"email": "admin@example.org", "role": "Admin"},
                {"email": "m@example.org", "role": "Manager", "loc": "EU", "team": "PRI"},
                {"email": "x@example.org", "role": "Janitor"}
            ]"#,
        )
        .unwrap();
        let hasher = PasswordHasher::with_iterations(1_000);

        assert_eq!(seed_users(&conn, &hasher, &users, "initial").unwrap(), 2);
        assert_eq!(seed_users(&conn, &hasher, &users, "initial").unwrap(), 0);

        let (manager, _) = repository::find_credentials_by_email(&conn, "m@example.org").unwrap().unwrap();
        let eu = repository::get_location_by_name(&conn, "EU").unwrap().unwrap();
        assert_eq!(manager.location_id, eu.id);
    }

    // The only test that touches the seed variables.
    #[test]
    fn seed_from_env_reads_accounts_and_password() {
        let dir = tempfile::tempdir().unwrap();
        let conn = crate::db::open_database(&dir.path().join("vault.db")).unwrap();
        std::env::set_var(
            SEED_USERS_VAR,
            r#"[{"email": "ops@example.org", "role": "Manager", "team": "EPA"}]"#,
        );
        std::env::set_var(SEED_PASSWORD_VAR, "initial");

        let hasher = PasswordHasher::with_iterations(1_000);
        assert_eq!(seed_from_env(&conn, &hasher).unwrap(), 1);
        assert_eq!(seed_from_env(&conn, &hasher).unwrap(), 0);

        std::env::set_var(SEED_USERS_VAR, "not json");
        assert!(seed_users_from_env().is_empty());
        std::env::remove_var(SEED_USERS_VAR);
        std::env::remove_var(SEED_PASSWORD_VAR);
        assert!(seed_password_from_env().is_none());

        let (ops, hash) = repository::find_credentials_by_email(&conn, "ops@example.org").unwrap().unwrap();
        let epa = repository::get_team_by_name(&conn, "EPA").unwrap().unwrap();
        assert_eq!(ops.team_id, epa.id);
        assert!(crate::crypto::verify_password("initial", &hash).unwrap());
    }

    #[test]
    fn no_initial_password_creates_nothing() {
        let conn = open_memory_database().unwrap();
        seed_catalogue(&conn).unwrap();
        let users = vec![SeedUser {
            email: "a@example.org".into(),
            role: "Admin".into(),
            location: None,
            team: None,
        }];
        let hasher = PasswordHasher::with_iterations(1_000);
        assert_eq!(seed_users(&conn, &hasher, &users, "").unwrap(), 0);
        assert_eq!(repository::count_users(&conn).unwrap(), 0);
    }
}
