//! Principal domain model.
//!
//! # Responsibility
//! - Describe the acting user resolved by the authentication collaborator.
//! - Keep role a closed enumeration so invalid roles fail at construction.
//!
//! # Invariants
//! - Every principal carries exactly one role.
//! - Role changes are not modelled by core.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of an authenticated actor.
pub type PrincipalId = Uuid;

/// Baseline authorization category of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted access to every task operation.
    Admin,
    /// Creates tasks and manages the tasks they created.
    Manager,
    /// Works on tasks they are assigned to.
    Employee,
}

impl Role {
    /// All roles in declaration order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Employee];

    /// Stable lowercase name used in storage and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    /// Parses a role name, ignoring surrounding whitespace and case.
    pub fn parse(value: &str) -> Result<Self, RoleParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            _ => Err(RoleParseError(value.to_string())),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a role name is outside the closed role set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl Display for RoleParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported role `{}`; expected admin|manager|employee",
            self.0
        )
    }
}

impl Error for RoleParseError {}

/// The authenticated actor performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: PrincipalId, role: Role) -> Self {
        Self { id, role }
    }

    /// Creates a principal with a freshly generated id.
    pub fn generate(role: Role) -> Self {
        Self::new(Uuid::new_v4(), role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::{Principal, Role, RoleParseError};

    #[test]
    fn parse_accepts_known_roles_case_insensitively() {
        assert_eq!(Role::parse("ADMIN").expect("admin parse"), Role::Admin);
        assert_eq!(Role::parse(" manager ").expect("manager parse"), Role::Manager);
        assert_eq!(Role::parse("Employee").expect("employee parse"), Role::Employee);
    }

    #[test]
    fn parse_rejects_unknown_role() {
        let err = Role::parse("superuser").expect_err("unknown role must fail");
        assert_eq!(err, RoleParseError("superuser".to_string()));
    }

    #[test]
    fn as_str_round_trips_through_parse() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()).expect("round trip"), role);
        }
    }

    #[test]
    fn generated_principals_have_distinct_ids() {
        let first = Principal::generate(Role::Employee);
        let second = Principal::generate(Role::Employee);
        assert_ne!(first.id, second.id);
        assert!(!first.is_admin());
    }
}
