use std::path::PathBuf;
use structopt::StructOpt;

/// Provision the application role, database and tables on a Postgres
/// cluster, then verify the application role can read them.
///
/// Settings come from the config file and the DB_* environment variables;
/// values in the file win.
#[derive(Debug, StructOpt)]
#[structopt(name = "pgbootstrap")]
pub struct Cli {
    /// The path to the config file (optional)
    #[structopt(short, long, parse(from_os_str))]
    pub file: Option<PathBuf>,

    /// Dry run: print the statements without connecting
    #[structopt(short, long)]
    pub dryrun: bool,

    /// Disable colors in the summary table
    #[structopt(long)]
    pub no_color: bool,
}

// Parse the command line arguments
pub fn parse() -> Cli {
    Cli::from_args()
}
