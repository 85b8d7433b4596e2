//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use labforge::compute::ComputeError;
use labforge::config::{config_file_path, ConfigFileError};
use labforge::ledger::LedgerError;
use labforge::orchestrator::OrchestratorError;
use labforge::report;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Cloud authentication failed
    Auth(ComputeError),
    /// A lab build failed
    Build(OrchestratorError),
    /// A lab teardown failed
    Scuttle(OrchestratorError),
    /// The build ledger could not be read or written
    Ledger(LedgerError),
    /// The ledger could not be rendered as JSON
    LedgerDump(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Run 'labforge config init' to create a configuration file,");
                eprintln!("then edit {}", config_file_path().display());
            }
            CliError::Auth(_) => {
                eprintln!();
                eprintln!("Check the [cloud] section of {}:", config_file_path().display());
                eprintln!("  1. auth_url points at your provider's identity endpoint");
                eprintln!("  2. username and api_key are current");
                eprintln!("  3. region matches your account, or is left empty");
            }
            CliError::Build(OrchestratorError::FlavorNotFound { candidates, .. }) => {
                eprintln!();
                eprintln!("Flavors on this account:");
                eprint!("{}", report::flavor_table(candidates));
            }
            CliError::Build(OrchestratorError::ImageNotFound { candidates, .. }) => {
                eprintln!();
                eprintln!("Images on this account:");
                eprint!("{}", report::image_table(candidates));
            }
            CliError::Build(OrchestratorError::ImageAmbiguous { matches, .. }) => {
                eprintln!();
                eprintln!("Matching images:");
                eprint!("{}", report::image_table(matches));
                eprintln!();
                eprintln!("Pass a longer fragment or the image id.");
            }
            CliError::Build(OrchestratorError::NotEnoughRam { .. }) => {
                eprintln!();
                eprintln!("Free quota by scuttling a lab you no longer need:");
                eprintln!("  labforge scuttle <lab>");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Auth(e) => write!(f, "Cloud authentication failed: {}", e),
            CliError::Build(e) => write!(f, "Build failed: {}", e),
            CliError::Scuttle(e) => write!(f, "Teardown failed: {}", e),
            CliError::Ledger(e) => write!(f, "Ledger error: {}", e),
            CliError::LedgerDump(e) => write!(f, "Failed to render ledger: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Auth(e) => Some(e),
            CliError::Build(e) => Some(e),
            CliError::Scuttle(e) => Some(e),
            CliError::Ledger(e) => Some(e),
            CliError::LedgerDump(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        CliError::Ledger(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::LedgerDump(e)
    }
}
