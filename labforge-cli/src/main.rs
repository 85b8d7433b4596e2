//! LabForge CLI - build and manage disposable cloud labs.
//!
//! This binary provides a command-line interface to the labforge library.

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod runner;

use commands::build::BuildArgs;
use commands::config::ConfigCommands;
use commands::info::InfoArgs;
use commands::ledger::LedgerArgs;
use commands::scuttle::ScuttleArgs;

#[derive(Parser)]
#[command(name = "labforge")]
#[command(about = "Build multi-node cloud labs from a single command", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a lab: two controllers plus compute nodes
    Build(BuildArgs),

    /// Show the nodes of a built lab
    Info(InfoArgs),

    /// Dump the raw build ledger as JSON
    Ledger(LedgerArgs),

    /// Delete every instance of a lab and clear its ledger entries
    Scuttle(ScuttleArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build(args) => commands::build::run(args).await,
        Commands::Info(args) => commands::info::run(args).await,
        Commands::Ledger(args) => commands::ledger::run(args).await,
        Commands::Scuttle(args) => commands::scuttle::run(args).await,
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(error) = result {
        error.exit();
    }
}
