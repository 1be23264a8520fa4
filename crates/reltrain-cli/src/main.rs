mod cmd_branch_name;
mod cmd_plan;
mod cmd_run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use reltrain_core::ReleaseConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "RELTRAIN_LOG";

#[derive(Parser)]
#[command(
    name = "reltrain",
    version,
    about = "Weekly release train for an Azure DevOps repository"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the release branch, reset its version, then build and merge back
    Run {
        /// Path to the JSON config file
        #[arg(long, default_value = "secrets.json")]
        config: PathBuf,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
        /// Debug-level logging unless RELTRAIN_LOG says otherwise
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show what a run would do, without writing anything
    Plan {
        /// Path to the JSON config file
        #[arg(long, default_value = "secrets.json")]
        config: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the release branch name for a date (default: today)
    BranchName {
        /// Path to the JSON config file
        #[arg(long, default_value = "secrets.json")]
        config: PathBuf,
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            config,
            json,
            verbose,
        } => {
            init_tracing(verbose);
            let config = load_config(&config)?;
            let ok = cmd_run::execute(config, json)?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Plan { config, json } => {
            init_tracing(false);
            cmd_plan::execute(load_config(&config)?, json)
        }
        Command::BranchName { config, date } => {
            cmd_branch_name::execute(&load_config(&config)?, date.as_deref())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<ReleaseConfig> {
    ReleaseConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
