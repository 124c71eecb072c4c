use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A dotted capability name, e.g. `patient.read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A named bundle of direct permission grants.
///
/// `parent_id` places the role in the organisational forest. It is not
/// consulted by default permission resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

/// An authenticated actor. Carries its resolved role so guards can run
/// without another query.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub role: Role,
    pub location_id: i64,
    pub team_id: i64,
    pub failed_login_attempts: u32,
    pub locked_until: Option<NaiveDateTime>,
}

/// Input for administrative user creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub role_id: i64,
    pub location_id: i64,
    pub team_id: i64,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Self-service profile changes. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

/// Administrative reassignment. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAssignment {
    pub role_id: Option<i64>,
    pub location_id: Option<i64>,
    pub team_id: Option<i64>,
    pub phone_number: Option<String>,
}
