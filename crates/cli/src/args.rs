use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const ENV_HELP: &str = "\
Environment:
  JOBSTARTER_CONFIG        Configuration file (default: jobstarter.toml)
  JOBSTARTER_STARTER_*     Override a [starter] setting, e.g. JOBSTARTER_STARTER_PARALLEL=4
  JOBSTARTER_LOG_FORMAT    Set to `json` for JSON logs
  JOBSTARTER_OUTPUT        Set to `json` for JSON `status` output
  RUST_LOG                 Log filter (default: info)";

/// jobstarter - start batch-job scripts once, with bounded concurrency
#[derive(Parser, Debug)]
#[command(name = "jobstarter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Start every pending job script under a directory tree", long_about = None)]
#[command(after_help = ENV_HELP)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // `jobstarter DIR` is shorthand for `jobstarter run DIR`.
    #[command(flatten)]
    pub target: Target,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Root of the script tree (overrides starter.directory)
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start every pending script (default)
    Run(Target),

    /// Print the status of every script
    Status(Target),

    /// Print the number of pending and total scripts
    Count(Target),
}

/// What to do once configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    Status,
    Count,
}

impl Cli {
    /// The requested action and directory override, `run` when no
    /// subcommand was given.
    pub fn into_parts(self) -> (Action, Option<PathBuf>) {
        match self.command {
            None => (Action::Run, self.target.directory),
            Some(Commands::Run(target)) => (Action::Run, target.directory),
            Some(Commands::Status(target)) => (Action::Status, target.directory),
            Some(Commands::Count(target)) => (Action::Count, target.directory),
        }
    }
}
