//! User model.
//!
//! Defines the `User` entity and the closed `Role` enumeration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string does not name a role.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

/// User role for permission management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular user.
    #[default]
    User,
    /// Moderator.
    Moderator,
    /// Administrator.
    Admin,
}

impl Role {
    /// Every role, in ascending privilege.
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    /// Convert role to its stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Whether a holder of this role may change other users' roles.
    pub fn can_modify_roles(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive parse.
///
/// Token claims go through this, so `"ADMIN"`, `"admin "` and
/// `"admin\0user"` are all rejected rather than normalized.
impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Email address, trimmed and lowercased.
    pub email: String,
    /// Argon2id PHC hash.
    pub password_hash: String,
    /// Current role.
    pub role: Role,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last role change (or registration).
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Normalized email address.
    pub email: String,
    /// Pre-computed password hash.
    pub password_hash: String,
    /// Initial role (defaults to `User`).
    pub role: Role,
}

impl NewUser {
    /// Create a new user with the default role.
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::User,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(role.to_string(), role.as_str());
        }
    }

    #[test]
    fn test_role_parse_is_strict() {
        for bad in ["ADMIN", "Admin", "admin ", " user", "admin\0user", "", "superuser"] {
            let err = bad.parse::<Role>().unwrap_err();
            assert_eq!(err, UnknownRole(bad.to_string()));
        }
    }

    #[test]
    fn test_role_default() {
        assert_eq!(Role::default(), Role::User);
        assert_eq!(NewUser::new("a@x.com", "hash").role, Role::User);
    }

    #[test]
    fn test_can_modify_roles() {
        assert!(Role::Admin.can_modify_roles());
        assert!(!Role::Moderator.can_modify_roles());
        assert!(!Role::User.can_modify_roles());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Moderator).unwrap(), "\"moderator\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert!(serde_json::from_str::<Role>("\"root\"").is_err());
    }

    #[test]
    fn test_new_user_builder() {
        let user = NewUser::new("mod@x.com", "hash").with_role(Role::Moderator);
        assert_eq!(user.email, "mod@x.com");
        assert_eq!(user.role, Role::Moderator);
    }
}
