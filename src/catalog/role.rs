use super::escape_identifier;
use crate::config::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role options granted at creation time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleAttribute {
    Login,
    CreateDb,
    CreateRole,
    Inherit,
}

impl fmt::Display for RoleAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RoleAttribute::Login => write!(f, "LOGIN"),
            RoleAttribute::CreateDb => write!(f, "CREATEDB"),
            RoleAttribute::CreateRole => write!(f, "CREATEROLE"),
            RoleAttribute::Inherit => write!(f, "INHERIT"),
        }
    }
}

/// The application role. The password is resolved from the settings at start
/// up and only leaves the process inside the `CREATE ROLE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub password: Secret,
    pub attributes: Vec<RoleAttribute>,
}

impl RoleSpec {
    /// ```sql
    /// CREATE ROLE name [ WITH ] option [ ... ] PASSWORD 'password'
    /// ```
    pub fn to_sql(&self, redact: bool) -> String {
        let password = if redact {
            Secret::redacted().to_string()
        } else {
            self.password.expose().replace('\'', "''")
        };

        let mut options = self
            .attributes
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>();
        options.push(format!("PASSWORD '{}'", password));

        format!(
            "CREATE ROLE {} WITH {};",
            escape_identifier(&self.name),
            options.join(" ")
        )
    }
}
