//! Scuttle command - delete a lab's instances and ledger entries.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use labforge::ledger::default_ledger_path;
use labforge::orchestrator::scuttle_lab;
use labforge::retry::RetryPolicy;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the scuttle command.
#[derive(Debug, Args)]
pub struct ScuttleArgs {
    /// Lab name
    pub lab: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,

    /// Ledger file holding the lab's records
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

/// Run the scuttle command.
pub async fn run(args: ScuttleArgs) -> Result<(), CliError> {
    if !args.yes && !confirmed(&args.lab) {
        println!("Aborted.");
        return Ok(());
    }

    let runner = CliRunner::new()?;
    runner.log_startup("scuttle");

    let ledger_path = args.ledger.unwrap_or_else(default_ledger_path);
    let compute = runner.authenticate().await?;
    let policy = RetryPolicy::new(5).with_delay(Duration::from_secs(2));

    println!("Scuttling lab '{}'...", args.lab);
    let report = scuttle_lab(&compute, &ledger_path, &args.lab, &policy)
        .await
        .map_err(CliError::Scuttle)?;

    if report.deleted.is_empty() && report.vanished.is_empty() {
        println!("Nothing to delete for lab '{}'.", args.lab);
        return Ok(());
    }

    for node in &report.deleted {
        println!("  deleted {}", node);
    }
    for node in &report.vanished {
        println!("  already gone {}", node);
    }
    println!(
        "Lab '{}' scuttled: {} deleted, {} already gone.",
        report.lab,
        report.deleted.len(),
        report.vanished.len()
    );

    Ok(())
}

/// Asks for confirmation on the terminal. Anything but an explicit yes
/// declines.
fn confirmed(lab: &str) -> bool {
    print!("Delete every instance of lab '{}'? [y/N] ", lab);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes" | "YES")
}
