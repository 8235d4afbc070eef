pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator CLI",
    long_about = "Run supplier outreach batches, inspect effective configuration, and check runtime readiness.",
    after_help = "Examples:\n  procura run --roster data/suppliers.json\n  procura config\n  procura doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run an outreach batch over a supplier roster and report per-supplier outcomes")]
    Run {
        #[arg(long, help = "Path to the supplier roster JSON file")]
        roster: PathBuf,
        #[arg(long, help = "Restrict the run to one channel (email or telegram)")]
        channel: Option<String>,
        #[arg(long, help = "Write the full batch report as JSON to this path")]
        out: Option<PathBuf>,
        #[arg(long, help = "Path to the config file (defaults to procura.toml or config/procura.toml)")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override outreach.overall_timeout_secs")]
        timeout_secs: Option<u64>,
        #[arg(long, help = "Override outreach.poll_interval_secs")]
        poll_interval_secs: Option<u64>,
        #[arg(long, help = "Override logging.level")]
        log_level: Option<String>,
        #[arg(long, help = "Validate config and roster and walk the loop without any network I/O")]
        dry_run: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, field schema, channel adapters, and LLM credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            roster,
            channel,
            out,
            config,
            timeout_secs,
            poll_interval_secs,
            log_level,
            dry_run,
        } => commands::run::run(commands::run::RunArgs {
            roster,
            channel,
            out,
            config,
            timeout_secs,
            poll_interval_secs,
            log_level,
            dry_run,
        }),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
