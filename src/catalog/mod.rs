//! The objects one run provisions, as an ordered list of typed steps.
//!
//! The catalog is built once from the resolved settings (role and database
//! names, the role password) and a [SchemaConfig] (tables and grants). Steps
//! come out in dependency order: role, database, tables, grants.

mod database;
mod grant;
mod role;
mod schema;
mod step;
mod table;

pub use database::DatabaseSpec;
pub use grant::{GrantObject, GrantSpec, GrantTarget, Privilege};
pub use role::{RoleAttribute, RoleSpec};
pub use schema::{ColumnConfig, GrantConfig, SchemaConfig, TableConfig, DEFAULT_SCHEMA};
pub use step::{database_id, role_id, table_id, verify_id, Scope, Step};
pub use table::{ColumnSpec, TableSpec};

use crate::config::Settings;
use crate::error::ConfigError;
use std::collections::HashSet;

const MAX_IDENTIFIER_LEN: usize = 63;
const SERIAL_TYPES: [&str; 3] = ["SERIAL", "BIGSERIAL", "SMALLSERIAL"];

/// Escape and quote a PostgreSQL identifier
pub fn escape_identifier(ident: &str) -> String {
    // Escape double quotes by doubling them
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Schema every table, sequence and grant lives in.
pub const TABLE_SCHEMA: &str = "public";

/// Schema-qualified, quoted name of a relation in [TABLE_SCHEMA].
pub fn qualified_name(name: &str) -> String {
    format!("{}.{}", escape_identifier(TABLE_SCHEMA), escape_identifier(name))
}

/// Lowercase, unquoted-safe identifier: `[a-z_][a-z0-9_]*`, at most 63 bytes.
/// Names must survive Postgres case folding so existence checks find them.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }

    name.len() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Words that start a column constraint rather than continue a type name.
const CONSTRAINT_KEYWORDS: [&str; 14] = [
    "PRIMARY",
    "KEY",
    "REFERENCES",
    "NOT",
    "NULL",
    "DEFAULT",
    "UNIQUE",
    "CHECK",
    "CONSTRAINT",
    "COLLATE",
    "GENERATED",
    "IDENTITY",
    "AS",
    "ON",
];

/// A type name (`TEXT`, `DOUBLE PRECISION`) with an optional `(n)` or
/// `(n,m)` modifier, and nothing else.
fn is_sql_type(sql_type: &str) -> bool {
    let sql_type = sql_type.trim();
    let (base, modifier) = match sql_type.find('(') {
        Some(open) => (sql_type[..open].trim_end(), Some(&sql_type[open..])),
        None => (sql_type, None),
    };

    let modifier_ok = match modifier {
        None => true,
        Some(modifier) => modifier
            .strip_prefix('(')
            .and_then(|m| m.strip_suffix(')'))
            .map(|inner| {
                let parts = inner.split(',').map(str::trim).collect::<Vec<_>>();
                parts.len() <= 2
                    && parts
                        .iter()
                        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
            })
            .unwrap_or(false),
    };

    modifier_ok
        && !base.is_empty()
        && base.split(' ').all(|word| {
            let mut chars = word.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !CONSTRAINT_KEYWORDS.contains(&word.to_ascii_uppercase().as_str())
        })
}

fn catalog_error(message: String) -> ConfigError {
    ConfigError::Catalog(message)
}

#[derive(Debug, Clone)]
pub struct Catalog {
    database: String,
    steps: Vec<Step>,
}

impl Catalog {
    pub fn build(settings: &Settings, schema: &SchemaConfig) -> Result<Self, ConfigError> {
        let role = RoleSpec {
            name: settings.app_role.clone(),
            password: settings.app_password.clone(),
            attributes: schema.role_attributes.clone(),
        };
        let database = DatabaseSpec {
            name: settings.db_name.clone(),
            owner: role.name.clone(),
        };

        let tables = schema
            .tables
            .iter()
            .map(|t| Self::table(t, &database.name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut table_names = HashSet::new();
        for table in &tables {
            if !table_names.insert(table.name.as_str()) {
                return Err(catalog_error(format!("duplicated table: {}", table.name)));
            }
        }

        let mut grants: Vec<GrantSpec> = Vec::new();
        for config in &schema.grants {
            let grant = Self::grant(config, &tables, &role.name)?;

            // Entries on the same objects become one step
            match grants
                .iter_mut()
                .find(|g| g.on == grant.on && g.objects == grant.objects)
            {
                Some(existing) => {
                    existing.privileges.extend(grant.privileges);
                    existing.privileges.sort();
                    existing.privileges.dedup();
                }
                None => grants.push(grant),
            }
        }

        let mut steps = vec![Step::CreateRole(role), Step::CreateDatabase(database)];
        steps.extend(tables.into_iter().map(Step::CreateTable));
        steps.extend(grants.into_iter().map(Step::Grant));

        Self::check_order(&steps)?;

        Ok(Self {
            database: settings.db_name.clone(),
            steps,
        })
    }

    fn table(config: &TableConfig, database: &str) -> Result<TableSpec, ConfigError> {
        if !is_identifier(&config.name) {
            return Err(catalog_error(format!(
                "table name `{}` is not a lowercase identifier",
                config.name
            )));
        }
        if config.columns.is_empty() {
            return Err(catalog_error(format!("table {} has no columns", config.name)));
        }

        let mut names = HashSet::new();
        for column in &config.columns {
            if !is_identifier(&column.name) {
                return Err(catalog_error(format!(
                    "column name `{}.{}` is not a lowercase identifier",
                    config.name, column.name
                )));
            }
            if !names.insert(column.name.as_str()) {
                return Err(catalog_error(format!(
                    "duplicated column: {}.{}",
                    config.name, column.name
                )));
            }
            if !is_sql_type(&column.sql_type) {
                return Err(catalog_error(format!(
                    "column {}.{} has an invalid type `{}`",
                    config.name, column.name, column.sql_type
                )));
            }
        }

        let primary_keys = config
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .collect::<Vec<_>>();
        let pk = match primary_keys.as_slice() {
            [pk] => pk,
            _ => {
                return Err(catalog_error(format!(
                    "table {} must have exactly one primary key column, found {}",
                    config.name,
                    primary_keys.len()
                )))
            }
        };
        if !SERIAL_TYPES.contains(&pk.sql_type.trim().to_ascii_uppercase().as_str()) {
            return Err(catalog_error(format!(
                "primary key {}.{} must be auto-incrementing ({}), got {}",
                config.name,
                pk.name,
                SERIAL_TYPES.join(", "),
                pk.sql_type
            )));
        }
        // The sequence name must not be truncated by the server.
        if config.name.len() + pk.name.len() + "__seq".len() > MAX_IDENTIFIER_LEN {
            return Err(catalog_error(format!(
                "table {} and primary key {} are too long for a sequence name",
                config.name, pk.name
            )));
        }

        Ok(TableSpec {
            name: config.name.clone(),
            database: database.to_string(),
            columns: config
                .columns
                .iter()
                .map(|c| ColumnSpec {
                    name: c.name.clone(),
                    sql_type: c.sql_type.trim().to_string(),
                    nullable: c.nullable && !c.primary_key,
                    primary_key: c.primary_key,
                })
                .collect(),
        })
    }

    fn grant(config: &GrantConfig, tables: &[TableSpec], grantee: &str) -> Result<GrantSpec, ConfigError> {
        if config.objects.is_empty() {
            return Err(catalog_error(format!("grant on {} has no objects", config.on)));
        }
        if config.privileges.is_empty() {
            return Err(catalog_error(format!(
                "grant on {}{:?} has no privileges",
                config.on, config.objects
            )));
        }

        // Check valid privileges for the target kind
        let valid = config.on.valid_privileges();
        for privilege in &config.privileges {
            if !valid.contains(privilege) {
                return Err(catalog_error(format!(
                    "privilege {} is not valid on {}s, expected one of {:?}",
                    privilege, config.on, valid
                )));
            }
        }

        let mut privileges = config.privileges.clone();
        privileges.sort();
        privileges.dedup();

        let mut objects = Vec::new();
        for name in &config.objects {
            let table = tables.iter().find(|t| &t.name == name).ok_or_else(|| {
                catalog_error(format!("grant on {} `{}` names an undeclared table", config.on, name))
            })?;

            let object_name = match config.on {
                GrantTarget::Tables => table.name.clone(),
                GrantTarget::Sequences => table.sequence_name().ok_or_else(|| {
                    catalog_error(format!("table {} has no primary key sequence", table.name))
                })?,
            };

            objects.push(GrantObject {
                name: object_name,
                table: table.name.clone(),
            });
        }

        Ok(GrantSpec {
            on: config.on,
            objects,
            privileges,
            grantee: grantee.to_string(),
        })
    }

    /// Every step must come strictly after the steps it depends on, and step
    /// ids must be unique.
    fn check_order(steps: &[Step]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for step in steps {
            for dep in step.depends_on() {
                if !seen.contains(&dep) {
                    return Err(catalog_error(format!(
                        "step {} depends on {}, which is not created before it",
                        step.id(),
                        dep
                    )));
                }
            }
            if !seen.insert(step.id()) {
                return Err(catalog_error(format!("duplicated step: {}", step.id())));
            }
        }

        Ok(())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.steps.iter().filter_map(|s| match s {
            Step::CreateTable(table) => Some(table),
            _ => None,
        })
    }

    /// Ids of the verification steps, one per table, in catalog order.
    pub fn verification_ids(&self) -> Vec<String> {
        self.tables().map(|t| verify_id(&t.name)).collect()
    }

    /// Every planned step id: provisioning first, then verification.
    pub fn planned_ids(&self) -> Vec<String> {
        let mut ids = self.steps.iter().map(|s| s.id()).collect::<Vec<_>>();
        ids.extend(self.verification_ids());
        ids
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{ConnectionSection, Secret};
    use indoc::indoc;
    use std::collections::HashMap;

    pub(crate) fn settings() -> Settings {
        let env: HashMap<String, String> = [
            ("DB_HOST", "localhost"),
            ("DB_PORT", "5432"),
            ("DB_ADMIN_USER", "postgres"),
            ("DB_ADMIN_PASSWORD", "postgres"),
            ("DB_APP_ROLE", "admin"),
            ("DB_APP_PASSWORD", "app-secret"),
            ("DB_NAME", "omnias_db"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Settings::resolve(&ConnectionSection::default(), &env).unwrap()
    }

    pub(crate) fn default_catalog() -> Catalog {
        Catalog::build(&settings(), &SchemaConfig::builtin().unwrap()).unwrap()
    }

    fn build(schema: &str) -> Result<Catalog, ConfigError> {
        let schema: SchemaConfig = serde_yaml::from_str(schema).unwrap();
        Catalog::build(&settings(), &schema)
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("omnias_db"));
        assert!(is_identifier("_t1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1table"));
        assert!(!is_identifier("Documents"));
        assert!(!is_identifier("doc-name"));
        assert!(!is_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_default_catalog_steps() {
        let catalog = default_catalog();

        let ids = catalog.steps().iter().map(|s| s.id()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                "role:admin",
                "database:omnias_db",
                "table:documents",
                "table:summaries",
                "grant:table:documents,summaries",
                "grant:sequence:documents,summaries",
            ]
        );
        assert_eq!(
            catalog.verification_ids(),
            vec!["verify:documents", "verify:summaries"]
        );
        assert_eq!(catalog.planned_ids().len(), 8);
        assert_eq!(catalog.database(), "omnias_db");
    }

    #[test]
    fn test_default_catalog_sql() {
        let catalog = default_catalog();
        let sqls = catalog.steps().iter().map(|s| s.to_sql()).collect::<Vec<_>>();

        assert_eq!(sqls[0], "CREATE ROLE \"admin\" WITH LOGIN PASSWORD '********';");
        assert_eq!(sqls[1], "CREATE DATABASE \"omnias_db\" OWNER \"admin\";");
        assert_eq!(
            sqls[2],
            "CREATE TABLE \"public\".\"documents\" (\"user_id\" SERIAL PRIMARY KEY, \"user_name\" VARCHAR(255) NOT NULL, \"user_password\" VARCHAR(255) NOT NULL, \"video_path\" TEXT, \"doc_contents\" TEXT, \"doc_summaries\" TEXT);"
        );
        assert_eq!(
            sqls[4],
            "GRANT SELECT, INSERT, UPDATE ON TABLE \"public\".\"documents\", \"public\".\"summaries\" TO \"admin\";"
        );
        assert_eq!(
            sqls[5],
            "GRANT USAGE ON SEQUENCE \"public\".\"documents_user_id_seq\", \"public\".\"summaries_doc_id_seq\" TO \"admin\";"
        );

        // the password only appears in the executable statement
        assert!(catalog.steps()[0]
            .to_executable_sql()
            .contains("PASSWORD 'app-secret'"));
        assert!(!sqls.iter().any(|s| s.contains("app-secret")));
    }

    #[test]
    fn test_dependencies_and_scopes() {
        let catalog = default_catalog();
        let steps = catalog.steps();

        assert!(steps[0].depends_on().is_empty());
        assert_eq!(steps[1].depends_on(), vec!["role:admin"]);
        assert_eq!(steps[2].depends_on(), vec!["database:omnias_db"]);
        assert_eq!(
            steps[4].depends_on(),
            vec!["role:admin", "table:documents", "table:summaries"]
        );

        assert_eq!(steps[0].scope(), Scope::Cluster);
        assert_eq!(steps[1].scope(), Scope::Cluster);
        assert_eq!(steps[2].scope(), Scope::Database);
        assert_eq!(steps[5].scope(), Scope::Database);
    }

    // Adding a table is a schema change only.
    #[test]
    fn test_extra_table_is_appended() {
        let catalog = build(indoc! {"
            tables:
              - name: documents
                columns:
                  - { name: user_id, type: SERIAL, primary_key: true }
              - name: notes
                columns:
                  - { name: note_id, type: bigserial, primary_key: true }
                  - { name: body, type: TEXT, nullable: false }
            grants:
              - on: tables
                objects: [notes]
                privileges: [SELECT]
        "})
        .unwrap();

        let ids = catalog.steps().iter().map(|s| s.id()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                "role:admin",
                "database:omnias_db",
                "table:documents",
                "table:notes",
                "grant:table:notes",
            ]
        );
        assert_eq!(catalog.tables().count(), 2);
    }

    #[test]
    fn test_invalid_catalogs() {
        let cases = [
            (
                "two primary keys",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                          - { name: b, type: SERIAL, primary_key: true }
                "},
            ),
            (
                "no primary key",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: TEXT }
                "},
            ),
            (
                "primary key not auto-incrementing",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: INTEGER, primary_key: true }
                "},
            ),
            (
                "duplicated table",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                "},
            ),
            (
                "duplicated column",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                          - { name: a, type: TEXT }
                "},
            ),
            (
                "uppercase table",
                indoc! {"
                    tables:
                      - name: Docs
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                "},
            ),
            (
                "injected type",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                          - { name: b, type: \"TEXT); DROP TABLE t; --\" }
                "},
            ),
            (
                "constraint in type",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                          - { name: b, type: \"TEXT REFERENCES other\" }
                "},
            ),
            (
                "grant on undeclared table",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                    grants:
                      - on: tables
                        objects: [missing]
                        privileges: [SELECT]
                "},
            ),
            (
                "usage on a table",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                    grants:
                      - on: tables
                        objects: [t]
                        privileges: [USAGE]
                "},
            ),
            (
                "insert on a sequence",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                    grants:
                      - on: sequences
                        objects: [t]
                        privileges: [INSERT]
                "},
            ),
            (
                "empty privileges",
                indoc! {"
                    tables:
                      - name: t
                        columns:
                          - { name: a, type: SERIAL, primary_key: true }
                    grants:
                      - on: tables
                        objects: [t]
                        privileges: []
                "},
            ),
        ];

        for (name, schema) in cases {
            match build(schema) {
                Err(ConfigError::Catalog(_)) => {}
                other => panic!("{}: expected a catalog error, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_sql_types() {
        for valid in [
            "TEXT",
            "VARCHAR(255)",
            "varchar (64)",
            "NUMERIC(10, 2)",
            "DOUBLE PRECISION",
            "TIMESTAMP WITH TIME ZONE",
            "BIGSERIAL",
        ] {
            assert!(is_sql_type(valid), "{}", valid);
        }
        for invalid in [
            "",
            "TEXT PRIMARY KEY",
            "TEXT REFERENCES x",
            "INTEGER NOT NULL",
            "TEXT DEFAULT x",
            "VARCHAR(a)",
            "NUMERIC(1,2,3)",
            "VARCHAR(255) NOT NULL",
            "TEXT,",
            "TEXT  COLLATE",
        ] {
            assert!(!is_sql_type(invalid), "{}", invalid);
        }
    }

    #[test]
    fn test_grants_on_same_objects_are_merged() {
        let catalog = build(indoc! {"
            tables:
              - name: t
                columns:
                  - { name: a, type: SERIAL, primary_key: true }
            grants:
              - on: tables
                objects: [t]
                privileges: [UPDATE, SELECT]
              - on: tables
                objects: [t]
                privileges: [INSERT, SELECT]
        "})
        .unwrap();

        let grants = catalog
            .steps()
            .iter()
            .filter(|s| matches!(s, Step::Grant(_)))
            .collect::<Vec<_>>();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].id(), "grant:table:t");
        assert_eq!(
            grants[0].to_sql(),
            "GRANT SELECT, INSERT, UPDATE ON TABLE \"public\".\"t\" TO \"admin\";"
        );
    }

    #[test]
    fn test_repeated_privilege_is_granted_once() {
        let catalog = build(indoc! {"
            tables:
              - name: t
                columns:
                  - { name: a, type: SERIAL, primary_key: true }
            grants:
              - on: tables
                objects: [t]
                privileges: [SELECT, INSERT, SELECT]
        "})
        .unwrap();

        match catalog.steps().last() {
            Some(Step::Grant(grant)) => {
                assert_eq!(grant.privileges, vec![Privilege::Select, Privilege::Insert])
            }
            other => panic!("expected a grant, got {:?}", other),
        }
    }

    #[test]
    fn test_check_order_rejects_table_before_database() {
        let table = TableSpec {
            name: "t".to_string(),
            database: "omnias_db".to_string(),
            columns: vec![],
        };
        let steps = vec![
            Step::CreateRole(RoleSpec {
                name: "admin".to_string(),
                password: Secret::new("x"),
                attributes: vec![],
            }),
            Step::CreateTable(table),
            Step::CreateDatabase(DatabaseSpec {
                name: "omnias_db".to_string(),
                owner: "admin".to_string(),
            }),
        ];

        let err = Catalog::check_order(&steps).unwrap_err();
        assert!(err.to_string().contains("table:t depends on database:omnias_db"));
    }
}
