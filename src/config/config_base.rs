use crate::catalog::SchemaConfig;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub use super::connection::{ConnectionDescriptor, ConnectionSection};

/// The optional config file. Holds the connection settings and, when the
/// built-in schema is not wanted, the tables and grants to provision.
///  - `connection`: where to connect and which role/database to create.
///  - `schema`: the tables and grants. See [SchemaConfig].
///
/// [SchemaConfig]: crate::catalog::SchemaConfig
///
/// For example:
///
/// ```yaml
/// connection:
///   host: localhost
///   port: 5432
///   admin_user: postgres
///   admin_password: ${DB_ADMIN_PASSWORD}
///   app_role: admin
///   app_password: ${DB_APP_PASSWORD}
///   db_name: omnias_db
///
/// schema:
///   tables:
///     - name: notes
///       columns:
///         - { name: note_id, type: SERIAL, primary_key: true }
///         - { name: body, type: TEXT }
///   grants:
///     - on: tables
///       objects: [notes]
///       privileges: [SELECT, INSERT]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub schema: Option<SchemaConfig>,
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(s)?;

        Ok(config)
    }
}

impl Config {
    pub fn new(config_path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config: Config = config_str.parse()?;

        // expand env variables
        Ok(config.expand_env_vars())
    }

    // Expand env variables in config
    fn expand_env_vars(&self) -> Self {
        let mut config = self.clone();

        config.connection = config.connection.expand_env_vars();

        config
    }
}
