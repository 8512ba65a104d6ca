use super::{GrantTarget, Privilege, RoleAttribute};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Schema shipped with the binary: the `documents` and `summaries` tables of
/// the document/summary storage service.
pub const DEFAULT_SCHEMA: &str = include_str!("../../schema/default.yaml");

/// Declarative description of the tables and grants to provision.
///
/// ```yaml
/// role_attributes: [LOGIN]
/// tables:
///   - name: documents
///     columns:
///       - { name: user_id, type: SERIAL, primary_key: true }
///       - { name: user_name, type: VARCHAR(255), nullable: false }
/// grants:
///   - on: tables
///     objects: [documents]
///     privileges: [SELECT, INSERT, UPDATE]
///   - on: sequences
///     objects: [documents]
///     privileges: [USAGE]
/// ```
///
/// For `on: sequences` the objects are table names; the grant applies to the
/// sequence behind each table's serial primary key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default = "default_role_attributes")]
    pub role_attributes: Vec<RoleAttribute>,
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GrantConfig {
    pub on: GrantTarget,
    pub objects: Vec<String>,
    pub privileges: Vec<Privilege>,
}

fn default_role_attributes() -> Vec<RoleAttribute> {
    vec![RoleAttribute::Login]
}

fn default_nullable() -> bool {
    true
}

impl SchemaConfig {
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(DEFAULT_SCHEMA)?)
    }
}
