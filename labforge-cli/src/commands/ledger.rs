//! Ledger command - dump the raw build ledger as JSON.

use std::path::PathBuf;

use clap::Args;
use labforge::ledger::{default_ledger_path, Ledger};

use crate::error::CliError;

/// Arguments for the ledger command.
#[derive(Debug, Args)]
pub struct LedgerArgs {
    /// Limit the dump to one lab
    pub lab: Option<String>,

    /// Ledger file to read
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

/// Run the ledger command.
pub async fn run(args: LedgerArgs) -> Result<(), CliError> {
    let ledger_path = args.ledger.unwrap_or_else(default_ledger_path);

    let dump = match args.lab {
        Some(lab) => {
            let wanted = lab.clone();
            let entries =
                Ledger::update(&ledger_path, move |ledger| ledger.list(&wanted)).await?;
            if entries.is_empty() {
                println!("No lab named '{}' recorded in {}", lab, ledger_path.display());
                return Ok(());
            }
            serde_json::to_string_pretty(&entries)?
        }
        None => {
            let document =
                Ledger::update(&ledger_path, |ledger| ledger.document().clone()).await?;
            if document.is_empty() {
                println!("Ledger {} is empty", ledger_path.display());
                return Ok(());
            }
            serde_json::to_string_pretty(&document)?
        }
    };

    println!("{}", dump);
    Ok(())
}
