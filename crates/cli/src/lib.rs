pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use scoutpoints_core::config::{LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "scoutpoints",
    about = "Scoutpoints operator CLI",
    long_about = "Operate scoutpoints migrations, demo data, readiness checks, and the redemption approval queue.",
    after_help = "Examples:\n  scoutpoints doctor --json\n  scoutpoints migrate\n  scoutpoints pending --group grp-eagle"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset")]
    Seed,
    #[command(about = "Validate configuration and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show a group's current spendable balance")]
    Balance {
        #[arg(long, help = "Group identifier, e.g. grp-eagle")]
        group: String,
    },
    #[command(about = "List redemption requests awaiting approval for a group")]
    Pending {
        #[arg(long, help = "Group identifier, e.g. grp-eagle")]
        group: String,
    },
}

/// Installs the process-wide subscriber once; later calls are no-ops so
/// commands can share the helper freely.
pub(crate) fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Balance { group } => commands::balance::run(&group),
        Command::Pending { group } => commands::pending::run(&group),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
