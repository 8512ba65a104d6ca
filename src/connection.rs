use crate::catalog::{qualified_name, GrantTarget, Privilege, Step, TableSpec, TABLE_SCHEMA};
use crate::config::ConnectionDescriptor;
use crate::error::StepError;
use log::debug;
use postgres::error::SqlState;
use postgres::{Client, NoTls};

/// Queries and statements the provisioning engine needs, run with
/// administrative privileges.
pub trait AdminSession {
    fn role_exists(&mut self, role: &str) -> Result<bool, StepError>;

    fn database_exists(&mut self, database: &str) -> Result<bool, StepError>;

    /// Column names of a table in the current database, `None` if the table
    /// does not exist.
    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>, StepError>;

    fn has_privilege(
        &mut self,
        role: &str,
        on: GrantTarget,
        object: &str,
        privilege: Privilege,
    ) -> Result<bool, StepError>;

    /// Execute the statement that creates the step's object.
    fn apply(&mut self, step: &Step) -> Result<(), StepError>;

    /// Reconnect with the same credentials to another database.
    fn switch_database(&mut self, database: &str) -> Result<(), StepError>;
}

/// Read-only checks run as the application role.
pub trait ProbeSession {
    fn probe(&mut self, table: &TableSpec) -> Result<(), StepError>;
}

/// Opens sessions. Each session closes when it is dropped.
pub trait Connector {
    type Admin: AdminSession;
    type Probe: ProbeSession;

    fn admin(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Admin, StepError>;

    fn app(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Probe, StepError>;
}

/// Map a driver error onto the step error taxonomy.
pub fn classify(err: &postgres::Error) -> StepError {
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };

    classify_state(err.code(), message)
}

/// Errors without a SQLSTATE never reached the server: connection errors.
fn classify_state(code: Option<&SqlState>, message: String) -> StepError {
    let code = match code {
        Some(code) => code,
        None => return StepError::Connection(message),
    };

    if *code == SqlState::INSUFFICIENT_PRIVILEGE {
        StepError::Permission(message)
    } else if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_CATALOG_NAME {
        StepError::MissingObject(message)
    } else if *code == SqlState::UNDEFINED_COLUMN {
        // column "x" does not exist / column "x" of relation "t" does not exist
        let names = quoted_names(&message);
        StepError::SchemaMismatch {
            table: names.get(1).cloned().unwrap_or_default(),
            missing: vec![names.first().cloned().unwrap_or(message)],
        }
    } else if *code == SqlState::QUERY_CANCELED {
        StepError::Timeout(message)
    } else if *code == SqlState::DUPLICATE_OBJECT
        || *code == SqlState::DUPLICATE_DATABASE
        || *code == SqlState::DUPLICATE_TABLE
    {
        StepError::AlreadyExists(message)
    } else if *code == SqlState::INVALID_PASSWORD
        || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        || *code == SqlState::TOO_MANY_CONNECTIONS
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CANNOT_CONNECT_NOW
    {
        StepError::Connection(message)
    } else {
        StepError::Statement(message)
    }
}

pub struct DbConnection {
    descriptor: ConnectionDescriptor,
    client: Client,
}

impl DbConnection {
    /// Connect with the descriptor's credentials. Both the connect and every
    /// statement are bounded by the descriptor's timeout.
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self, StepError> {
        let mut config = postgres::Config::new();
        config
            .host(&descriptor.host)
            .port(descriptor.port)
            .user(&descriptor.user)
            .password(descriptor.password.expose())
            .dbname(&descriptor.database)
            .application_name("pgbootstrap")
            .connect_timeout(descriptor.timeout)
            .options(&format!(
                "-c statement_timeout={}",
                descriptor.timeout.as_millis()
            ));

        let client = config.connect(NoTls).map_err(|e| match classify(&e) {
            // nothing has been mutated yet; any failure here is a connection error
            StepError::Connection(m) => StepError::Connection(m),
            other => StepError::Connection(other.to_string()),
        })?;
        debug!("Connected to database: {}", descriptor);

        Ok(Self {
            descriptor: descriptor.clone(),
            client,
        })
    }

    fn exists(&mut self, sql: &str, param: &str) -> Result<bool, StepError> {
        let row = self
            .client
            .query_opt(sql, &[&param])
            .map_err(|e| classify(&e))?;

        Ok(row.is_some())
    }
}

impl AdminSession for DbConnection {
    fn role_exists(&mut self, role: &str) -> Result<bool, StepError> {
        self.exists("SELECT 1 FROM pg_roles WHERE rolname = $1", role)
    }

    fn database_exists(&mut self, database: &str) -> Result<bool, StepError> {
        self.exists("SELECT 1 FROM pg_database WHERE datname = $1", database)
    }

    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>, StepError> {
        let exists = self
            .client
            .query_opt(
                "SELECT 1 FROM pg_tables WHERE schemaname = $1 AND tablename = $2",
                &[&TABLE_SCHEMA, &table],
            )
            .map_err(|e| classify(&e))?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let sql = "
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        ";
        let columns = self
            .client
            .query(sql, &[&TABLE_SCHEMA, &table])
            .map_err(|e| classify(&e))?
            .iter()
            .map(|row| row.get(0))
            .collect::<Vec<String>>();

        Ok(Some(columns))
    }

    fn has_privilege(
        &mut self,
        role: &str,
        on: GrantTarget,
        object: &str,
        privilege: Privilege,
    ) -> Result<bool, StepError> {
        let sql = match on {
            GrantTarget::Tables => "SELECT has_table_privilege($1::name, $2::text, $3::text)",
            GrantTarget::Sequences => "SELECT has_sequence_privilege($1::name, $2::text, $3::text)",
        };
        // quoted so the lookup matches the name exactly
        let object = qualified_name(object);
        let privilege = privilege.to_string();

        let row = self
            .client
            .query_one(sql, &[&role, &object, &privilege])
            .map_err(|e| classify(&e))?;

        Ok(row.get(0))
    }

    fn apply(&mut self, step: &Step) -> Result<(), StepError> {
        debug!("apply {}: {}", step.id(), step.to_sql());

        // CREATE DATABASE cannot run inside a transaction block; the simple
        // query protocol runs a single statement without one.
        self.client
            .batch_execute(&step.to_executable_sql())
            .map_err(|e| classify(&e))
    }

    fn switch_database(&mut self, database: &str) -> Result<(), StepError> {
        let descriptor = self.descriptor.with_database(database);
        *self = DbConnection::connect(&descriptor)?;

        Ok(())
    }
}

impl ProbeSession for DbConnection {
    fn probe(&mut self, table: &TableSpec) -> Result<(), StepError> {
        match self.client.query(table.to_probe_sql().as_str(), &[]) {
            Ok(_) => Ok(()),
            Err(e) => match classify(&e) {
                StepError::SchemaMismatch { missing, .. } => Err(StepError::SchemaMismatch {
                    table: table.name.clone(),
                    missing,
                }),
                other => Err(other),
            },
        }
    }
}

/// Double-quoted names in a server message, in order, e.g. `x` and `t` from
/// `column "x" of relation "t" does not exist`.
fn quoted_names(message: &str) -> Vec<String> {
    message
        .split('"')
        .skip(1)
        .step_by(2)
        .map(|name| name.to_string())
        .collect()
}

impl Drop for DbConnection {
    fn drop(&mut self) {
        debug!("Closing connection: {}", self.descriptor);
    }
}

/// Opens real sessions over the Postgres wire protocol.
pub struct PostgresConnector;

impl Connector for PostgresConnector {
    type Admin = DbConnection;
    type Probe = DbConnection;

    fn admin(&self, descriptor: &ConnectionDescriptor) -> Result<DbConnection, StepError> {
        DbConnection::connect(descriptor)
    }

    fn app(&self, descriptor: &ConnectionDescriptor) -> Result<DbConnection, StepError> {
        DbConnection::connect(descriptor)
    }
}

// These tests need a local PostgreSQL with a `postgres` superuser:
// `cargo test -- --ignored`
#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RoleAttribute, RoleSpec};
    use crate::config::Secret;
    use rand::{thread_rng, Rng};
    use std::time::Duration;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: Secret::new("postgres"),
            database: "postgres".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_quoted_names() {
        assert_eq!(quoted_names("column \"video_path\" does not exist"), vec!["video_path"]);
        assert_eq!(
            quoted_names("column \"body\" of relation \"notes\" does not exist"),
            vec!["body", "notes"]
        );
        assert!(quoted_names("no quotes here").is_empty());
    }

    fn state(code: &SqlState, message: &str) -> StepError {
        classify_state(Some(code), message.to_string())
    }

    #[test]
    fn test_classify_sqlstate() {
        assert!(matches!(
            state(&SqlState::INSUFFICIENT_PRIVILEGE, "permission denied to create database"),
            StepError::Permission(_)
        ));
        assert!(matches!(
            state(&SqlState::UNDEFINED_TABLE, "relation \"documents\" does not exist"),
            StepError::MissingObject(_)
        ));
        assert!(matches!(
            state(&SqlState::INVALID_CATALOG_NAME, "database \"omnias_db\" does not exist"),
            StepError::MissingObject(_)
        ));
        assert!(matches!(
            state(&SqlState::QUERY_CANCELED, "canceling statement due to statement timeout"),
            StepError::Timeout(_)
        ));
        for code in [
            SqlState::DUPLICATE_OBJECT,
            SqlState::DUPLICATE_DATABASE,
            SqlState::DUPLICATE_TABLE,
        ] {
            assert!(matches!(state(&code, "already exists"), StepError::AlreadyExists(_)));
        }
        assert!(matches!(
            state(&SqlState::INVALID_PASSWORD, "password authentication failed"),
            StepError::Connection(_)
        ));
        assert!(matches!(
            state(&SqlState::SYNTAX_ERROR, "syntax error at or near \"TABLE\""),
            StepError::Statement(_)
        ));
        assert!(matches!(
            classify_state(None, "connection refused".to_string()),
            StepError::Connection(_)
        ));
    }

    #[test]
    fn test_classify_undefined_column_is_schema_mismatch() {
        assert_eq!(
            state(
                &SqlState::UNDEFINED_COLUMN,
                "column \"video_path\" of relation \"documents\" does not exist"
            ),
            StepError::SchemaMismatch {
                table: "documents".to_string(),
                missing: vec!["video_path".to_string()],
            }
        );
        assert_eq!(
            state(&SqlState::UNDEFINED_COLUMN, "column \"video_path\" does not exist"),
            StepError::SchemaMismatch {
                table: String::new(),
                missing: vec!["video_path".to_string()],
            }
        );
    }

    #[test]
    #[ignore]
    fn test_connect() {
        let mut db = DbConnection::connect(&descriptor()).expect("cannot connect");
        assert!(db.database_exists("postgres").unwrap());
        assert!(db.role_exists("postgres").unwrap());
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        let mut unreachable = descriptor();
        unreachable.host = "127.0.0.1".to_string();
        unreachable.port = 1;

        match DbConnection::connect(&unreachable) {
            Err(StepError::Connection(_)) => {}
            Err(other) => panic!("expected a connection error, got {:?}", other),
            Ok(_) => panic!("expected a connection error"),
        }
    }

    #[test]
    #[ignore]
    fn test_create_role_is_found() {
        let mut db = DbConnection::connect(&descriptor()).unwrap();

        let role = random_name();
        assert!(!db.role_exists(&role).unwrap());

        let step = Step::CreateRole(RoleSpec {
            name: role.clone(),
            password: Secret::new("it's secret"),
            attributes: vec![RoleAttribute::Login],
        });
        db.apply(&step).unwrap();
        assert!(db.role_exists(&role).unwrap());

        // a second create is reported as already existing
        assert!(matches!(db.apply(&step), Err(StepError::AlreadyExists(_))));

        // Clean up
        db.client
            .batch_execute(&format!("DROP ROLE IF EXISTS {}", role))
            .unwrap();
    }

    #[test]
    #[ignore]
    fn test_missing_table_has_no_columns() {
        let mut db = DbConnection::connect(&descriptor()).unwrap();
        assert_eq!(db.table_columns(&random_name()).unwrap(), None);
        assert!(db.database_exists("postgres").unwrap());
    }

    fn random_name() -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
        let mut rng = thread_rng();

        let name: String = (0..10)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();

        format!("pgbootstrap_{}", name)
    }
}
