use crate::catalog::{Catalog, SchemaConfig};
use crate::config::{Config, Settings, Source};
use crate::connection::Connector;
use crate::error::ConfigError;
use crate::provision::provision;
use crate::report::{ExitStatus, RunReport};
use crate::verify::verify;
use ansi_term::Colour::{Purple, Red};
use log::{debug, error, info};
use std::fmt;
use std::path::PathBuf;

/// Phases of one run. `Aborted` is reachable from `ResolvingCredentials` and
/// `Provisioning`; reporting happens either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    ResolvingCredentials,
    Provisioning,
    Verifying,
    Aborted,
    Reporting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RunState::Start => "start",
            RunState::ResolvingCredentials => "resolving-credentials",
            RunState::Provisioning => "provisioning",
            RunState::Verifying => "verifying",
            RunState::Aborted => "aborted",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Options for one run, usually taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub file: Option<PathBuf>,
    pub dryrun: bool,
}

/// What a run produced: the ordered report and the exit status.
#[derive(Debug)]
pub struct Outcome {
    pub report: RunReport,
    pub exit: ExitStatus,
    /// States visited, in order.
    pub states: Vec<RunState>,
    /// Set when the run stopped before provisioning: configuration or admin
    /// connection error.
    pub setup_error: Option<String>,
}

struct Run {
    state: RunState,
    states: Vec<RunState>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RunState::Start,
            states: vec![RunState::Start],
        }
    }

    fn enter(&mut self, next: RunState) {
        debug!("run state: {} -> {}", self.state, next);
        self.state = next;
        self.states.push(next);
    }

    fn finish(mut self, report: RunReport, exit: ExitStatus, setup_error: Option<String>) -> Outcome {
        self.enter(RunState::Reporting);
        self.enter(RunState::Done);

        Outcome {
            report,
            exit,
            states: self.states,
            setup_error,
        }
    }
}

/// Load the config file (if any), resolve settings against `source` and
/// build the catalog.
pub fn resolve(options: &Options, source: &dyn Source) -> Result<(Settings, Catalog), ConfigError> {
    let config = match &options.file {
        Some(file) => {
            if file.is_dir() {
                return Err(ConfigError::Invalid {
                    key: "file",
                    reason: format!("{} is a directory", file.display()),
                });
            }
            Config::new(file)?
        }
        None => Config::default(),
    };

    let settings = Settings::resolve(&config.connection, source)?;
    let schema = match &config.schema {
        Some(schema) => schema.clone(),
        None => SchemaConfig::builtin()?,
    };
    let catalog = Catalog::build(&settings, &schema)?;

    Ok((settings, catalog))
}

/// Run every phase against the cluster behind `connector`.
pub fn apply<C: Connector>(options: &Options, source: &dyn Source, connector: &C) -> Outcome {
    let mut run = Run::new();
    let mut report = RunReport::new();

    run.enter(RunState::ResolvingCredentials);
    let (settings, catalog) = match resolve(options, source) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{}: {}", Red.paint("Configuration error"), e);
            run.enter(RunState::Aborted);
            return run.finish(report, ExitStatus::Setup, Some(e.to_string()));
        }
    };
    info!("Resolved settings:\n{}", settings);

    // Print the plan, connect to nothing
    if options.dryrun {
        for step in catalog.steps() {
            info!("{}: {}", Purple.paint("Dry-run"), step.id());
            println!("-- {}\n{}", step.id(), step.to_sql());
        }
        report.fill_pending(&catalog.planned_ids(), "dry-run");
        return run.finish(report, ExitStatus::Success, None);
    }

    run.enter(RunState::Provisioning);
    let progress = {
        let admin = settings.admin_descriptor();
        let mut session = match connector.admin(&admin) {
            Ok(session) => session,
            Err(e) => {
                error!("{}: {}", Red.paint("Cannot connect"), admin);
                error!("  -> {}: {}", Red.paint("Error details"), e);
                run.enter(RunState::Aborted);
                report.fill_pending(&catalog.planned_ids(), "admin connection failed");
                return run.finish(report, ExitStatus::Setup, Some(e.to_string()));
            }
        };
        info!("Connected to database: {}", admin);

        provision(&catalog, &mut session, &mut report)
        // admin session released here
    };

    if let Some(failed) = &progress.aborted_at {
        run.enter(RunState::Aborted);
        report.fill_pending(&catalog.planned_ids(), &format!("run aborted at {}", failed));
    } else {
        run.enter(RunState::Verifying);
        let app = settings.app_descriptor();
        match connector.app(&app) {
            Ok(mut session) => {
                info!("Connected to database: {}", app);
                verify(&catalog, Ok(&mut session), &mut report);
            }
            Err(e) => verify::<C::Probe>(&catalog, Err(e), &mut report),
        }
    }

    let exit = if report.is_success() {
        ExitStatus::Success
    } else {
        ExitStatus::StepFailed
    };

    run.finish(report, exit, None)
}
