//! Build command - provision a complete lab.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use labforge::ledger::{default_ledger_path, Ledger};
use labforge::orchestrator::{BuildRequest, Orchestrator};
use labforge::pool::WorkerPool;
use labforge::remote::SshShell;
use labforge::report;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the build command.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Lab name; prefixes every node name and the lab network
    pub lab: String,

    /// Total node count, the two controllers included
    #[arg(long, default_value_t = 3)]
    pub nodes: usize,

    /// Image name fragment or id (default from config)
    #[arg(long)]
    pub image: Option<String>,

    /// Controller flavor RAM in MB (default from config)
    #[arg(long)]
    pub controller_ram: Option<u32>,

    /// Compute flavor RAM in MB (default from config)
    #[arg(long)]
    pub compute_ram: Option<u32>,

    /// Keypair to inject into every node
    #[arg(long)]
    pub key_name: Option<String>,

    /// Public key file to register the keypair from
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Do not attach the provider's internal service network
    #[arg(long)]
    pub no_service_net: bool,

    /// Nodes built (and configured) at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Ledger file to record the build in
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

/// Run the build command.
pub async fn run(args: BuildArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("build");
    let config = runner.config();
    let defaults = &config.build;

    let mut request = BuildRequest::new(
        &args.lab,
        args.nodes,
        args.image.clone().unwrap_or_else(|| defaults.image.clone()),
    );
    request.controller_ram_mb = args.controller_ram.unwrap_or(defaults.controller_ram_mb);
    request.compute_ram_mb = args.compute_ram.unwrap_or(defaults.compute_ram_mb);
    request.net_cidr = defaults.net_cidr.clone();
    request.key_name = args.key_name.clone().or_else(|| defaults.key_name.clone());
    request.key_file = args.key_file.clone().or_else(|| defaults.key_file.clone());
    request.attach_service_net = defaults.attach_service_net && !args.no_service_net;

    let ledger_path = args.ledger.clone().unwrap_or_else(default_ledger_path);
    let concurrency = args.concurrency.unwrap_or(defaults.concurrency);

    println!("Building lab '{}':", args.lab);
    println!(
        "  Nodes:   {} ({} compute + 2 controllers)",
        request.node_count,
        request.node_count.saturating_sub(2)
    );
    println!("  Image:   {}", request.image);
    println!("  Network: {} ({})", request.net_label(), request.net_cidr);
    println!("  Ledger:  {}", ledger_path.display());
    println!();

    let compute = runner.authenticate().await?;
    let shell = SshShell::new(config.remote.clone().into());

    let orchestrator = Orchestrator::new(Arc::new(compute), Arc::new(shell), &ledger_path)
        .with_lifecycle(defaults.lifecycle_policy())
        .with_pool(WorkerPool::new(concurrency))
        .with_progress(atty::is(atty::Stream::Stderr));

    let start = Instant::now();
    let report = orchestrator.build(&request).await.map_err(CliError::Build)?;
    let elapsed = start.elapsed();

    let lab = args.lab.clone();
    let entries = Ledger::update(&ledger_path, move |ledger| ledger.list(&lab)).await?;
    println!();
    print!("{}", report::lab_table(&args.lab, &entries));
    println!();

    if report.is_complete() {
        println!(
            "Lab '{}' is ready: {} nodes ACTIVE and configured in {:.0}s.",
            args.lab,
            report.built.len(),
            elapsed.as_secs_f64()
        );
    } else {
        println!(
            "Lab '{}' is up with {} of {} nodes. Abandoned:",
            args.lab,
            report.built.len(),
            args.nodes
        );
        for node in &report.abandoned {
            println!("  {}", node);
        }
    }

    Ok(())
}
