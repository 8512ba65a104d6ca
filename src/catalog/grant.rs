use super::{escape_identifier, qualified_name};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Usage,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Privilege::Select => write!(f, "SELECT"),
            Privilege::Insert => write!(f, "INSERT"),
            Privilege::Update => write!(f, "UPDATE"),
            Privilege::Usage => write!(f, "USAGE"),
        }
    }
}

/// Kind of object a grant set applies to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrantTarget {
    Tables,
    Sequences,
}

impl GrantTarget {
    pub fn valid_privileges(&self) -> &'static [Privilege] {
        match self {
            GrantTarget::Tables => &[Privilege::Select, Privilege::Insert, Privilege::Update],
            GrantTarget::Sequences => &[Privilege::Select, Privilege::Update, Privilege::Usage],
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            GrantTarget::Tables => "TABLE",
            GrantTarget::Sequences => "SEQUENCE",
        }
    }
}

impl fmt::Display for GrantTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrantTarget::Tables => write!(f, "table"),
            GrantTarget::Sequences => write!(f, "sequence"),
        }
    }
}

/// A granted object: a table, or the primary-key sequence of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantObject {
    pub name: String,
    pub table: String,
}

/// A set of privileges on one or more objects of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSpec {
    pub on: GrantTarget,
    pub objects: Vec<GrantObject>,
    pub privileges: Vec<Privilege>,
    pub grantee: String,
}

impl GrantSpec {
    /// ```sql
    /// GRANT { SELECT | INSERT | UPDATE } [, ...] ON [ TABLE ] table_name [, ...] TO role_name
    /// GRANT { USAGE | SELECT | UPDATE } [, ...] ON SEQUENCE sequence_name [, ...] TO role_name
    /// ```
    pub fn to_sql(&self) -> String {
        let privileges = self
            .privileges
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let objects = self
            .objects
            .iter()
            .map(|o| qualified_name(&o.name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "GRANT {} ON {} {} TO {};",
            privileges,
            self.on.keyword(),
            objects,
            escape_identifier(&self.grantee)
        )
    }
}
