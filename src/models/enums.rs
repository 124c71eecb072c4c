use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

// Fixed audit vocabulary. Stored verbatim in `audit_logs.action`.
str_enum!(AuditAction {
    LoginSuccess => "LOGIN_SUCCESS",
    LoginFailed => "LOGIN_FAILED",
    LoginLocked => "LOGIN_LOCKED",
    AccountLocked => "ACCOUNT_LOCKED",
    PasswordChange => "PASSWORD_CHANGE",
    ProfileUpdate => "PROFILE_UPDATE",
    AccessPatients => "ACCESS_PATIENTS",
    DecryptionOperation => "DECRYPTION_OPERATION",
    UploadPatients => "UPLOAD_PATIENTS",
    EncryptionOperation => "ENCRYPTION_OPERATION",
    UpdatePatient => "UPDATE_PATIENT",
    DeletePatient => "DELETE_PATIENT",
    BulkDelete => "BULK_DELETE",
    ViewStats => "VIEW_STATS",
    AccessDenied => "ACCESS_DENIED",
    AdminCreateUser => "ADMIN_CREATE_USER",
    AdminUnlockUser => "ADMIN_UNLOCK_USER",
    AdminResetPassword => "ADMIN_RESET_PASSWORD",
    AdminUpdateUser => "ADMIN_UPDATE_USER",
    AdminCreateRole => "ADMIN_CREATE_ROLE",
    AdminUpdateRolePerms => "ADMIN_UPDATE_ROLE_PERMS",
    AdminCreateLocation => "ADMIN_CREATE_LOCATION",
    AdminCreateTeam => "ADMIN_CREATE_TEAM",
    KeyRotation => "KEY_ROTATION",
});

// Listing sort keys. Only `PatientId` is plaintext in the store.
str_enum!(SortField {
    PatientId => "patient_id",
    FirstName => "first_name",
    LastName => "last_name",
    Dob => "dob",
    Gender => "gender",
});

str_enum!(SortOrder {
    Asc => "asc",
    Desc => "desc",
});

impl SortField {
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::PatientId)
    }
}

impl Default for SortField {
    fn default() -> Self {
        Self::PatientId
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}
