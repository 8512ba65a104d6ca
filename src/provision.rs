use crate::catalog::{Catalog, Scope, Step};
use crate::connection::AdminSession;
use crate::error::StepError;
use crate::report::{RunReport, StepResult};
use ansi_term::Colour::{Green, Purple, Red, Yellow};
use log::{debug, error, info, warn};

/// What the existence check found for a step's object.
#[derive(Debug)]
enum Existence {
    Absent,
    Present(String),
    /// Present, but not in a shape this run can accept.
    Mismatch(StepError),
}

/// How far provisioning got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Id of the step whose fatal error stopped the run.
    pub aborted_at: Option<String>,
}

impl Progress {
    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }
}

/// Apply the catalog's steps in order, appending exactly one result per step.
///
/// Each step first checks whether its object exists and only creates it when
/// it does not, so re-running converges without errors. A failed step blocks
/// every step that depends on it; a fatal (connection) error abandons all
/// remaining steps.
pub fn provision<S: AdminSession>(
    catalog: &Catalog,
    session: &mut S,
    report: &mut RunReport,
) -> Progress {
    let mut scope = Scope::Cluster;
    let mut aborted_at: Option<String> = None;

    for step in catalog.steps() {
        let id = step.id();

        if let Some(failed) = &aborted_at {
            report.push(StepResult::pending(&id, format!("run aborted at {}", failed)));
            continue;
        }

        if let Some(dep) = blocking_dependency(step, report) {
            warn!("{}: {} (blocked by {})", Yellow.paint("Not attempted"), id, dep);
            report.push(StepResult::pending(&id, format!("blocked by {}", dep)));
            continue;
        }

        if step.scope() == Scope::Database && scope == Scope::Cluster {
            debug!("switching admin session to database {}", catalog.database());
            if let Err(e) = session.switch_database(catalog.database()) {
                error!("{}: {}", Red.paint("Error"), id);
                error!("  -> {}: {}", Red.paint("Error details"), e);
                report.push(StepResult::failed(&id, e));
                aborted_at = Some(id);
                continue;
            }
            scope = Scope::Database;
        }

        let result = run_step(step, session);
        if let Some(e) = &result.error {
            if e.is_fatal() {
                aborted_at = Some(id);
            }
        }
        report.push(result);
    }

    Progress { aborted_at }
}

/// First dependency that did not succeed and was not skipped.
fn blocking_dependency(step: &Step, report: &RunReport) -> Option<String> {
    step.depends_on().into_iter().find(|dep| {
        !report
            .status_of(dep)
            .map(|status| status.is_done())
            .unwrap_or(false)
    })
}

fn run_step<S: AdminSession>(step: &Step, session: &mut S) -> StepResult {
    let id = step.id();
    let sql = step.to_sql();

    let existence = match check(step, session) {
        Ok(existence) => existence,
        Err(e) => {
            error!("{}: existence check for {} failed", Red.paint("Error"), id);
            error!("  -> {}: {}", Red.paint("Error details"), e);
            return StepResult::failed(&id, e);
        }
    };

    match existence {
        Existence::Present(detail) => {
            info!("{}: {} ({})", Purple.paint("Skipped"), id, detail);
            StepResult::skipped(&id, detail)
        }
        Existence::Mismatch(e) => {
            error!("{}: {}", Red.paint("Error"), id);
            error!("  -> {}: {}", Red.paint("Error details"), e);
            StepResult::failed(&id, e)
        }
        Existence::Absent => match session.apply(step) {
            Ok(()) => {
                info!("{}: {}", Green.paint("Success"), Purple.paint(&sql));
                StepResult::succeeded(&id, created(step))
            }
            // lost a race with another run; the object is there now
            Err(StepError::AlreadyExists(message)) => {
                info!("{}: {} ({})", Purple.paint("Skipped"), id, message);
                StepResult::skipped(&id, "already exists")
            }
            Err(e) => {
                error!("{}: {}", Red.paint("Error"), sql);
                error!("  -> {}: {}", Red.paint("Error details"), e);
                StepResult::failed(&id, e)
            }
        },
    }
}

fn created(step: &Step) -> &'static str {
    match step {
        Step::Grant(_) => "granted",
        _ => "created",
    }
}

fn check<S: AdminSession>(step: &Step, session: &mut S) -> Result<Existence, StepError> {
    let existence = match step {
        Step::CreateRole(role) => {
            if session.role_exists(&role.name)? {
                // the password is left as it is
                Existence::Present("role already exists".to_string())
            } else {
                Existence::Absent
            }
        }

        Step::CreateDatabase(database) => {
            if session.database_exists(&database.name)? {
                Existence::Present("database already exists".to_string())
            } else {
                Existence::Absent
            }
        }

        Step::CreateTable(table) => match session.table_columns(&table.name)? {
            None => Existence::Absent,
            Some(columns) => {
                let missing = table.missing_columns(&columns);
                if !missing.is_empty() {
                    return Ok(Existence::Mismatch(StepError::SchemaMismatch {
                        table: table.name.clone(),
                        missing,
                    }));
                }

                let expected = table.column_names();
                let extra = columns
                    .iter()
                    .filter(|c| !expected.contains(c))
                    .cloned()
                    .collect::<Vec<_>>();
                if !extra.is_empty() {
                    warn!(
                        "table {} has columns not in the catalog: {}",
                        table.name,
                        extra.join(", ")
                    );
                }

                Existence::Present("table already exists".to_string())
            }
        },

        Step::Grant(grant) => {
            let mut missing = vec![];
            for object in &grant.objects {
                for privilege in &grant.privileges {
                    if !session.has_privilege(&grant.grantee, grant.on, &object.name, *privilege)? {
                        missing.push(format!("{} on {}", privilege, object.name));
                    }
                }
            }

            if missing.is_empty() {
                Existence::Present("privileges already granted".to_string())
            } else {
                debug!("{} missing: {}", step.id(), missing.join(", "));
                Existence::Absent
            }
        }
    };

    Ok(existence)
}
