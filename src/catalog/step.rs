use super::{DatabaseSpec, GrantSpec, RoleSpec, TableSpec};
use std::fmt;

/// Which session a step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Cluster-wide objects, created from the maintenance database.
    Cluster,
    /// Objects inside the application database.
    Database,
}

/// One provisioning step. Steps are listed in the order they must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateRole(RoleSpec),
    CreateDatabase(DatabaseSpec),
    CreateTable(TableSpec),
    Grant(GrantSpec),
}

pub fn role_id(name: &str) -> String {
    format!("role:{}", name)
}

pub fn database_id(name: &str) -> String {
    format!("database:{}", name)
}

pub fn table_id(name: &str) -> String {
    format!("table:{}", name)
}

pub fn verify_id(table: &str) -> String {
    format!("verify:{}", table)
}

impl Step {
    pub fn id(&self) -> String {
        match self {
            Step::CreateRole(role) => role_id(&role.name),
            Step::CreateDatabase(database) => database_id(&database.name),
            Step::CreateTable(table) => table_id(&table.name),
            Step::Grant(grant) => format!(
                "grant:{}:{}",
                grant.on,
                grant
                    .objects
                    .iter()
                    .map(|o| o.table.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    /// Steps that must have succeeded (or found their object in place)
    /// before this one may run.
    pub fn depends_on(&self) -> Vec<String> {
        match self {
            Step::CreateRole(_) => vec![],
            Step::CreateDatabase(database) => vec![role_id(&database.owner)],
            Step::CreateTable(table) => vec![database_id(&table.database)],
            Step::Grant(grant) => {
                let mut deps = vec![role_id(&grant.grantee)];
                for object in &grant.objects {
                    let id = table_id(&object.table);
                    if !deps.contains(&id) {
                        deps.push(id);
                    }
                }
                deps
            }
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Step::CreateRole(_) | Step::CreateDatabase(_) => Scope::Cluster,
            Step::CreateTable(_) | Step::Grant(_) => Scope::Database,
        }
    }

    /// SQL safe to log and print: the role password is redacted.
    pub fn to_sql(&self) -> String {
        match self {
            Step::CreateRole(role) => role.to_sql(true),
            _ => self.to_executable_sql(),
        }
    }

    /// SQL sent to the server, secrets included.
    pub fn to_executable_sql(&self) -> String {
        match self {
            Step::CreateRole(role) => role.to_sql(false),
            Step::CreateDatabase(database) => database.to_sql(),
            Step::CreateTable(table) => table.to_sql(),
            Step::Grant(grant) => grant.to_sql(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
