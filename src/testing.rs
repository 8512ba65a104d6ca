//! In-memory cluster used by the unit tests in place of a Postgres server.

use crate::catalog::{GrantTarget, Privilege, Step, TableSpec};
use crate::config::ConnectionDescriptor;
use crate::connection::{AdminSession, Connector, ProbeSession};
use crate::error::StepError;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct ClusterState {
    pub roles: BTreeSet<String>,
    pub databases: BTreeSet<String>,
    /// table -> columns, in the application database
    pub tables: BTreeMap<String, Vec<String>>,
    /// (role, object, privilege)
    pub privileges: BTreeSet<(String, String, Privilege)>,
    /// statements applied, in order
    pub applied: Vec<String>,
    /// sessions currently open
    pub open_sessions: usize,

    pub deny_createdb: bool,
    pub unreachable: bool,
    pub drop_connection_on: Option<String>,
    pub timeout_on: Option<String>,
    /// the step's object appears concurrently, just before the create
    pub already_exists_on: Option<String>,
    pub app_login_fails: bool,
}

#[derive(Clone, Default)]
pub struct FakeCluster(pub Rc<RefCell<ClusterState>>);

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::cell::RefMut<'_, ClusterState> {
        self.0.borrow_mut()
    }
}

pub struct FakeSession {
    cluster: FakeCluster,
    database: String,
    user: String,
}

impl FakeSession {
    fn open(cluster: &FakeCluster, descriptor: &ConnectionDescriptor) -> Result<Self, StepError> {
        let mut state = cluster.state();
        if state.unreachable {
            return Err(StepError::Connection("connection refused".to_string()));
        }
        if !state.databases.contains(&descriptor.database) && descriptor.database != "postgres" {
            return Err(StepError::Connection(format!(
                "database \"{}\" does not exist",
                descriptor.database
            )));
        }
        state.open_sessions += 1;

        Ok(Self {
            cluster: cluster.clone(),
            database: descriptor.database.clone(),
            user: descriptor.user.clone(),
        })
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.cluster.state().open_sessions -= 1;
    }
}

impl AdminSession for FakeSession {
    fn role_exists(&mut self, role: &str) -> Result<bool, StepError> {
        Ok(self.cluster.state().roles.contains(role))
    }

    fn database_exists(&mut self, database: &str) -> Result<bool, StepError> {
        Ok(self.cluster.state().databases.contains(database))
    }

    fn table_columns(&mut self, table: &str) -> Result<Option<Vec<String>>, StepError> {
        Ok(self.cluster.state().tables.get(table).cloned())
    }

    fn has_privilege(
        &mut self,
        role: &str,
        _on: GrantTarget,
        object: &str,
        privilege: Privilege,
    ) -> Result<bool, StepError> {
        Ok(self
            .cluster
            .state()
            .privileges
            .contains(&(role.to_string(), object.to_string(), privilege)))
    }

    fn apply(&mut self, step: &Step) -> Result<(), StepError> {
        let mut state = self.cluster.state();
        let id = step.id();
        if state.drop_connection_on.as_deref() == Some(id.as_str()) {
            return Err(StepError::Connection("server closed the connection".to_string()));
        }
        if state.timeout_on.as_deref() == Some(id.as_str()) {
            return Err(StepError::Timeout(
                "canceling statement due to statement timeout".to_string(),
            ));
        }

        match step {
            Step::CreateRole(role) => {
                state.roles.insert(role.name.clone());
            }
            Step::CreateDatabase(database) => {
                if state.deny_createdb {
                    return Err(StepError::Permission(
                        "permission denied to create database".to_string(),
                    ));
                }
                state.databases.insert(database.name.clone());
            }
            Step::CreateTable(table) => {
                if self.database != table.database {
                    return Err(StepError::Statement(format!(
                        "table {} created in {}",
                        table.name, self.database
                    )));
                }
                state.tables.insert(table.name.clone(), table.column_names());
            }
            Step::Grant(grant) => {
                for object in &grant.objects {
                    for privilege in &grant.privileges {
                        state.privileges.insert((
                            grant.grantee.clone(),
                            object.name.clone(),
                            *privilege,
                        ));
                    }
                }
            }
        }
        if state.already_exists_on.as_deref() == Some(id.as_str()) {
            return Err(StepError::AlreadyExists(format!("{} already exists", id)));
        }
        state.applied.push(id);

        Ok(())
    }

    fn switch_database(&mut self, database: &str) -> Result<(), StepError> {
        if !self.cluster.state().databases.contains(database) {
            return Err(StepError::Connection(format!(
                "database \"{}\" does not exist",
                database
            )));
        }
        self.database = database.to_string();

        Ok(())
    }
}

impl ProbeSession for FakeSession {
    fn probe(&mut self, table: &TableSpec) -> Result<(), StepError> {
        let state = self.cluster.state();
        let columns = state
            .tables
            .get(&table.name)
            .ok_or_else(|| {
                StepError::MissingObject(format!("relation \"{}\" does not exist", table.name))
            })?;

        let allowed = state.privileges.contains(&(
            self.user.clone(),
            table.name.clone(),
            Privilege::Select,
        ));
        if !allowed {
            return Err(StepError::Permission(format!(
                "permission denied for table {}",
                table.name
            )));
        }

        let missing = table.missing_columns(columns);
        if !missing.is_empty() {
            return Err(StepError::SchemaMismatch {
                table: table.name.clone(),
                missing,
            });
        }

        Ok(())
    }
}

impl Connector for FakeCluster {
    type Admin = FakeSession;
    type Probe = FakeSession;

    fn admin(&self, descriptor: &ConnectionDescriptor) -> Result<FakeSession, StepError> {
        FakeSession::open(self, descriptor)
    }

    fn app(&self, descriptor: &ConnectionDescriptor) -> Result<FakeSession, StepError> {
        if self.state().app_login_fails {
            return Err(StepError::Connection(format!(
                "password authentication failed for user \"{}\"",
                descriptor.user
            )));
        }
        FakeSession::open(self, descriptor)
    }
}
