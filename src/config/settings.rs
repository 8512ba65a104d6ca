use super::{ConnectionDescriptor, ConnectionSection, Secret};
use crate::catalog::is_identifier;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where settings come from when the config file does not provide them.
pub trait Source {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
pub struct Environment;

impl Source for Environment {
    fn get(&self, key: &str) -> Option<String> {
        if envmnt::exists(key) {
            Some(envmnt::get_or(key, ""))
        } else {
            None
        }
    }
}

impl Source for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Resolved, validated settings for one run. Built once at start-up and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub admin_user: String,
    pub admin_password: Secret,
    pub admin_database: String,
    pub app_role: String,
    pub app_password: Secret,
    pub db_name: String,
    pub timeout: Duration,
}

impl Settings {
    /// Merge the config file section with the environment and validate.
    /// Values from the file win over environment variables.
    pub fn resolve(section: &ConnectionSection, source: &dyn Source) -> Result<Self, ConfigError> {
        let lookup = |value: &Option<String>, env: &str| -> Option<String> {
            value
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| source.get(env).map(|v| v.trim().to_string()))
                .filter(|v| !v.is_empty())
        };
        let required = |value: &Option<String>, key: &'static str, env: &'static str| {
            lookup(value, env).ok_or(ConfigError::Missing { key, env })
        };
        // Passwords are kept byte-for-byte; blank counts as unset.
        let secret = |value: &Option<String>, key: &'static str, env: &'static str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| source.get(env))
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { key, env })
        };

        let host = required(&section.host, "host", "DB_HOST")?;
        let port = required(&section.port, "port", "DB_PORT")?;
        let admin_user = required(&section.admin_user, "admin_user", "DB_ADMIN_USER")?;
        let admin_password =
            secret(&section.admin_password, "admin_password", "DB_ADMIN_PASSWORD")?;
        let app_role = required(&section.app_role, "app_role", "DB_APP_ROLE")?;
        let app_password = secret(&section.app_password, "app_password", "DB_APP_PASSWORD")?;
        let db_name = required(&section.db_name, "db_name", "DB_NAME")?;
        let admin_database = lookup(&section.admin_database, "DB_ADMIN_DATABASE")
            .unwrap_or_else(|| DEFAULT_ADMIN_DATABASE.to_string());
        let timeout = lookup(&section.timeout, "DB_TIMEOUT");

        validate_host(&host)?;
        let port = parse_port(&port)?;
        let timeout = parse_timeout(timeout.as_deref())?;
        validate_secret("admin_password", &admin_password)?;
        validate_secret("app_password", &app_password)?;

        if !is_identifier(&app_role) {
            return Err(invalid("app_role", &app_role));
        }
        if !is_identifier(&db_name) {
            return Err(invalid("db_name", &db_name));
        }
        if app_role == admin_user {
            return Err(ConfigError::Invalid {
                key: "app_role",
                reason: "must differ from admin_user, the verifier needs its own privileges"
                    .to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            admin_user,
            admin_password: Secret::new(admin_password),
            admin_database,
            app_role,
            app_password: Secret::new(app_password),
            db_name,
            timeout,
        })
    }

    /// Administrative session, initially on the maintenance database.
    pub fn admin_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: self.host.clone(),
            port: self.port,
            user: self.admin_user.clone(),
            password: self.admin_password.clone(),
            database: self.admin_database.clone(),
            timeout: self.timeout,
        }
    }

    /// Session scoped to the application role, on the application database.
    pub fn app_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: self.host.clone(),
            port: self.port,
            user: self.app_role.clone(),
            password: self.app_password.clone(),
            database: self.db_name.clone(),
            timeout: self.timeout,
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "admin:    {}", self.admin_descriptor())?;
        writeln!(f, "app:      {}", self.app_descriptor())?;
        write!(f, "timeout:  {}s", self.timeout.as_secs())
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: format!(
            "`{}` is not a lowercase SQL identifier ([a-z_][a-z0-9_]*, at most 63 bytes)",
            value
        ),
    }
}

/// Host name, IP address, or a unix-socket directory.
fn validate_host(host: &str) -> Result<(), ConfigError> {
    let valid = if host.starts_with('/') {
        !host.chars().any(char::is_whitespace)
    } else {
        host.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
            && !host.starts_with('-')
            && !host.starts_with('.')
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: "host",
            reason: format!("`{}` is not a host name, IP address or socket directory", host),
        })
    }
}

fn parse_port(port: &str) -> Result<u16, ConfigError> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ConfigError::Invalid {
            key: "port",
            reason: format!("`{}` is not a port number (1-65535)", port),
        }),
    }
}

fn parse_timeout(timeout: Option<&str>) -> Result<Duration, ConfigError> {
    let secs = match timeout {
        None => DEFAULT_TIMEOUT_SECS,
        Some(t) => match t.parse::<u64>() {
            Ok(s) if s > 0 => s,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "timeout",
                    reason: format!("`{}` is not a positive number of seconds", t),
                })
            }
        },
    };

    Ok(Duration::from_secs(secs))
}

// Never echo the value itself.
fn validate_secret(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.contains("${") {
        return Err(ConfigError::Invalid {
            key,
            reason: "contains an unexpanded environment variable reference".to_string(),
        });
    }

    Ok(())
}
