//! Users and database privileges

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Privilege granted to a user on a database
///
/// The variants mirror the query language's privilege tokens; the catalog
/// stores them opaquely and never interprets them beyond equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Privilege {
    /// No access
    #[default]
    NoPrivileges,
    /// Read-only access
    Read,
    /// Write-only access
    Write,
    /// Full access
    All,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::NoPrivileges => write!(f, "NO PRIVILEGES"),
            Privilege::Read => write!(f, "READ"),
            Privilege::Write => write!(f, "WRITE"),
            Privilege::All => write!(f, "ALL PRIVILEGES"),
        }
    }
}

/// A catalog user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name, unique across the catalog
    pub name: String,
    /// Opaque password digest (see [`crate::auth`])
    pub hash: String,
    /// Cluster administrator flag
    #[serde(default)]
    pub admin: bool,
    /// Per-database privileges; absent entries mean [`Privilege::NoPrivileges`]
    #[serde(default)]
    pub privileges: BTreeMap<String, Privilege>,
}

impl UserInfo {
    /// Effective privilege on a database. Admins hold all privileges
    /// everywhere.
    pub fn privilege(&self, database: &str) -> Privilege {
        if self.admin {
            return Privilege::All;
        }
        self.privileges
            .get(database)
            .copied()
            .unwrap_or(Privilege::NoPrivileges)
    }
}
