use anyhow::{Context, Result};
use env_logger::Env;
use pgbootstrap::apply::{apply, Options};
use pgbootstrap::cli;
use pgbootstrap::config::Environment;
use pgbootstrap::connection::PostgresConnector;
use pgbootstrap::report::Reporter;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = cli::parse();
    let options = Options {
        file: args.file,
        dryrun: args.dryrun,
    };

    let outcome = apply(&options, &Environment, &PostgresConnector);

    if let Some(e) = &outcome.setup_error {
        eprintln!("error: {}", e);
    }

    if !options.dryrun {
        Reporter::new(!args.no_color)
            .print(&outcome.report)
            .context("could not write the run summary")?;
    }

    std::process::exit(outcome.exit.code());
}
