//! Info command - show the nodes of a built lab.

use std::path::PathBuf;

use clap::Args;
use labforge::ledger::{default_ledger_path, Ledger};
use labforge::report;

use crate::error::CliError;

/// Arguments for the info command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Lab name
    pub lab: String,

    /// Ledger file to read
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

/// Run the info command.
pub async fn run(args: InfoArgs) -> Result<(), CliError> {
    let ledger_path = args.ledger.unwrap_or_else(default_ledger_path);
    let lab = args.lab.clone();
    let entries = Ledger::update(&ledger_path, move |ledger| ledger.list(&lab)).await?;

    if entries.is_empty() {
        println!(
            "No lab named '{}' recorded in {}",
            args.lab,
            ledger_path.display()
        );
        return Ok(());
    }

    print!("{}", report::lab_table(&args.lab, &entries));
    Ok(())
}
