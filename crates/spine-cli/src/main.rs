// spine-cli
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Talk to spine-api over reqwest, never touch storage
// directly (spec.md §6 "CLI presentation ... thin adapters over ops layer").
// Design Decision: exit codes follow spec.md §6: 0 success, 1
// user/validation/not-found, 2 infra/critical.

mod client;
mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};

use error::CliError;

#[derive(Parser)]
#[command(name = "spine")]
#[command(about = "spine-core CLI - runs, workflows, schedules, DLQ, alerts, sources, profiles")]
#[command(version)]
pub struct Cli {
    /// spine-api base URL
    #[arg(long, env = "SPINE_API_URL", default_value = "http://localhost:9100")]
    pub api_url: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execution ledger: submit, inspect, cancel, retry
    Runs {
        #[command(subcommand)]
        command: commands::runs::RunsCommand,
    },

    /// Registered workflow definitions and synchronous runs
    Workflows {
        #[command(subcommand)]
        command: commands::workflows::WorkflowsCommand,
    },

    /// Cron/interval-driven triggers
    Schedules {
        #[command(subcommand)]
        command: commands::schedules::SchedulesCommand,
    },

    /// Alert channels and delivered alerts
    Alerts {
        #[command(subcommand)]
        command: commands::alerts::AlertsCommand,
    },

    /// Registered input sources and fetch history
    Sources {
        #[command(subcommand)]
        command: commands::sources::SourcesCommand,
    },

    /// Layered environment configuration
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommand,
    },

    /// Named, inheritable TOML configuration profiles
    Profile {
        #[command(subcommand)]
        command: commands::profile::ProfileCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = client::Client::new(&cli.api_url);

    let result = match cli.command {
        Commands::Runs { command } => commands::runs::run(command, &client, cli.quiet).await,
        Commands::Workflows { command } => commands::workflows::run(command, &client, cli.quiet).await,
        Commands::Schedules { command } => commands::schedules::run(command, &client, cli.quiet).await,
        Commands::Alerts { command } => commands::alerts::run(command, &client, cli.quiet).await,
        Commands::Sources { command } => commands::sources::run(command, &client, cli.quiet).await,
        Commands::Config { command } => commands::config::run(command).await,
        Commands::Profile { command } => commands::profile::run(command).await,
    };

    if let Err(err) = result {
        if !cli.quiet {
            eprintln!("error: {err}");
        }
        std::process::exit(err.exit_code());
    }
}
