//! Principal directory contracts and SQLite implementation.
//!
//! # Responsibility
//! - Resolve principal ids to roles for assignee validation.
//! - Register principals provisioned by the authentication collaborator.
//!
//! # Invariants
//! - Stored roles are always one of the closed role names.

use crate::model::principal::{Principal, PrincipalId, Role};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Lookup contract for known principals.
pub trait PrincipalDirectory {
    /// Loads one principal by id.
    fn get_principal(&self, id: PrincipalId) -> RepoResult<Option<Principal>>;
    /// Inserts a principal or updates its role.
    fn upsert_principal(&self, principal: &Principal) -> RepoResult<()>;
    /// Lists principals with `role`, ordered by id.
    fn list_principals(&self, role: Role) -> RepoResult<Vec<Principal>>;
}

/// SQLite-backed principal directory.
pub struct SqlitePrincipalDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePrincipalDirectory<'conn> {
    /// Creates the directory over a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["principals"])?;
        Ok(Self { conn })
    }
}

impl PrincipalDirectory for SqlitePrincipalDirectory<'_> {
    fn get_principal(&self, id: PrincipalId) -> RepoResult<Option<Principal>> {
        self.conn
            .query_row(
                "SELECT id, role FROM principals WHERE id = ?1;",
                [id.to_string()],
                |row| Ok(read_raw(row)),
            )
            .optional()?
            .map(|raw| raw.and_then(parse_principal))
            .transpose()
    }

    fn upsert_principal(&self, principal: &Principal) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO principals (id, role) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET role = excluded.role;",
            params![principal.id.to_string(), principal.role.as_str()],
        )?;
        Ok(())
    }

    fn list_principals(&self, role: Role) -> RepoResult<Vec<Principal>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, role FROM principals WHERE role = ?1 ORDER BY id ASC;")?;
        let mut rows = stmt.query([role.as_str()])?;
        let mut principals = Vec::new();
        while let Some(row) = rows.next()? {
            principals.push(parse_principal(read_raw(row)?)?);
        }
        Ok(principals)
    }
}

fn read_raw(row: &Row<'_>) -> RepoResult<(String, String)> {
    Ok((row.get("id")?, row.get("role")?))
}

fn parse_principal((id_text, role_text): (String, String)) -> RepoResult<Principal> {
    let id = parse_uuid(&id_text, "principals.id")?;
    let role = Role::parse(&role_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in principals.role"))
    })?;
    Ok(Principal::new(id, role))
}
