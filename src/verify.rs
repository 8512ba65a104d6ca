use crate::catalog::{table_id, verify_id, Catalog};
use crate::connection::ProbeSession;
use crate::error::StepError;
use crate::report::{RunReport, StepResult};
use ansi_term::Colour::{Green, Red, Yellow};
use log::{error, info, warn};

/// Probe every declared table as the application role and append one result
/// per table.
///
/// `session` is the outcome of connecting as the application role; when the
/// connection failed, every probe that would have run fails with that error.
/// A probe is not attempted when its table was never created.
pub fn verify<P: ProbeSession>(
    catalog: &Catalog,
    session: Result<&mut P, StepError>,
    report: &mut RunReport,
) {
    let mut session = match session {
        Ok(session) => Ok(session),
        Err(e) => {
            error!("{}: cannot connect as the application role", Red.paint("Error"));
            error!("  -> {}: {}", Red.paint("Error details"), e);
            Err(e)
        }
    };

    for table in catalog.tables() {
        let id = verify_id(&table.name);
        let created = table_id(&table.name);

        let table_ready = report
            .status_of(&created)
            .map(|status| status.is_done())
            .unwrap_or(false);
        if !table_ready {
            warn!("{}: {} (blocked by {})", Yellow.paint("Not attempted"), id, created);
            report.push(StepResult::pending(&id, format!("blocked by {}", created)));
            continue;
        }

        let result = match &mut session {
            Err(e) => StepResult::failed(&id, e.clone()),
            Ok(session) => match session.probe(table) {
                Ok(()) => {
                    info!("{}: {} is readable", Green.paint("Verified"), table.name);
                    StepResult::succeeded(&id, "readable by application role")
                }
                Err(e) => {
                    error!("{}: {}", Red.paint("Error"), table.to_probe_sql());
                    error!("  -> {}: {}", Red.paint("Error details"), e);
                    StepResult::failed(&id, e)
                }
            },
        };
        report.push(result);
    }
}
