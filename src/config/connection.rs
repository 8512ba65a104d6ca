use super::Secret;
use envmnt::{ExpandOptions, ExpansionType};
use log::warn;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

/// Connection configuration section.
/// The admin user must be allowed to create roles and databases.
///
/// For example:
/// ```yaml
/// connection:
///   host: localhost
///   port: 5432
///   admin_user: postgres
///   admin_password: ${DB_ADMIN_PASSWORD}
///   app_role: admin
///   app_password: ${DB_APP_PASSWORD}
///   db_name: omnias_db
/// ```
///
/// Every field is optional here; missing values are looked up in the
/// environment when the settings are resolved.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    pub host: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub port: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub admin_database: Option<String>,
    pub app_role: Option<String>,
    pub app_password: Option<String>,
    pub db_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub timeout: Option<String>,
}

impl ConnectionSection {
    // Expand environment variables in every value.
    // For example: admin_password: ${PGPASSWORD}
    pub fn expand_env_vars(&self) -> Self {
        let expand = |key: &str, value: &Option<String>| {
            value.as_ref().map(|v| {
                let options = ExpandOptions {
                    expansion_type: Some(ExpansionType::UnixBracketsWithDefaults),
                    default_to_empty: false,
                };
                let expanded = envmnt::expand(v, Some(options));

                // Most likely, the user forgot to export the environment variable.
                if expanded.contains("${") {
                    warn!(
                        "connection.{} may not have fully expanded environment variables",
                        key
                    );
                }

                expanded
            })
        };

        Self {
            host: expand("host", &self.host),
            port: expand("port", &self.port),
            admin_user: expand("admin_user", &self.admin_user),
            admin_password: expand("admin_password", &self.admin_password),
            admin_database: expand("admin_database", &self.admin_database),
            app_role: expand("app_role", &self.app_role),
            app_password: expand("app_password", &self.app_password),
            db_name: expand("db_name", &self.db_name),
            timeout: expand("timeout", &self.timeout),
        }
    }
}

/// Accept `5432` as well as `"5432"`.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {:?}",
            other
        ))),
    }
}

/// Everything needed to open one session: where, as whom, into which database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub database: String,
    pub timeout: Duration,
}

impl ConnectionDescriptor {
    /// Same credentials, another database.
    pub fn with_database(&self, database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}
