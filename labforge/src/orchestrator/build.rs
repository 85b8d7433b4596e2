//! The top-level build flow.
//!
//! A build moves through fixed phases: validate the requested shape,
//! check tenant quota, resolve flavors and image, settle the lab network
//! and keypair, then fan the node jobs out over the worker pool and
//! finish with remote configuration. Everything before the fan-out is
//! fail-fast: no instance exists until the whole build is known to fit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::capacity;
use super::configure::{default_plan, ConfigurePlan, Configurator};
use super::error::OrchestratorError;
use super::resolve;
use crate::build::{
    plan_nodes, BuiltNode, JobDescriptor, LifecyclePolicy, NodeBuilder, NodeTemplate, PlanError,
    MIN_NODES,
};
use crate::compute::{as_attempt, ComputeApi, NicSpec, PUBLIC_NET_ID, SERVICE_NET_ID};
use crate::pool::WorkerPool;
use crate::progress::Spinner;
use crate::queue::WorkQueue;
use crate::remote::RemoteShell;
use crate::retry::RetryPolicy;

/// Workers building instances (and later configuring computes) at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// What to build.
///
/// Sizing is by exact flavor RAM; the image is matched by name fragment
/// or id. `node_count` covers the two controllers, so the smallest lab
/// (3 nodes) gets a single compute.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Lab name; prefixes every node name and labels the network.
    pub lab: String,
    /// Total nodes, controllers included.
    pub node_count: usize,
    /// Controller flavor RAM, in MB.
    pub controller_ram_mb: u32,
    /// Compute flavor RAM, in MB.
    pub compute_ram_mb: u32,
    /// Image name fragment or id.
    pub image: String,
    /// CIDR for the lab's isolated network.
    pub net_cidr: String,
    /// Keypair to inject, when set.
    pub key_name: Option<String>,
    /// Public key file to register the keypair from.
    pub key_file: Option<PathBuf>,
    /// Attach the provider's internal service network.
    pub attach_service_net: bool,
}

impl BuildRequest {
    pub fn new(lab: impl Into<String>, node_count: usize, image: impl Into<String>) -> Self {
        Self {
            lab: lab.into(),
            node_count,
            controller_ram_mb: 2048,
            compute_ram_mb: 2048,
            image: image.into(),
            net_cidr: "192.168.3.0/24".to_string(),
            key_name: None,
            key_file: None,
            attach_service_net: true,
        }
    }

    /// Network label for this lab.
    pub fn net_label(&self) -> String {
        format!("{}_net", self.lab)
    }

    /// RAM the whole build will claim, in MB.
    pub fn purposed_ram_mb(&self) -> i64 {
        let computes = (self.node_count - 2) as i64;
        2 * i64::from(self.controller_ram_mb) + computes * i64::from(self.compute_ram_mb)
    }
}

/// What a finished build produced.
#[derive(Debug)]
pub struct BuildReport {
    pub lab: String,
    /// Nodes that reached ACTIVE and were configured.
    pub built: Vec<BuiltNode>,
    /// Planned node names that never made it.
    pub abandoned: Vec<String>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// Drives a full lab build against one cloud account.
pub struct Orchestrator<C, R> {
    compute: Arc<C>,
    shell: Arc<R>,
    ledger_path: PathBuf,
    lifecycle: LifecyclePolicy,
    list_policy: RetryPolicy,
    pool: WorkerPool,
    plan: ConfigurePlan,
    show_progress: bool,
}

impl<C, R> Orchestrator<C, R>
where
    C: ComputeApi + 'static,
    R: RemoteShell + 'static,
{
    pub fn new(compute: Arc<C>, shell: Arc<R>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            compute,
            shell,
            ledger_path: ledger_path.into(),
            lifecycle: LifecyclePolicy::default(),
            list_policy: RetryPolicy::new(5).with_delay(std::time::Duration::from_secs(2)),
            pool: WorkerPool::new(DEFAULT_CONCURRENCY),
            plan: default_plan(),
            show_progress: false,
        }
    }

    /// Retry and requeue budgets for the instance lifecycle.
    pub fn with_lifecycle(mut self, lifecycle: LifecyclePolicy) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Retry policy for listing and lookup calls.
    pub fn with_list_policy(mut self, policy: RetryPolicy) -> Self {
        self.list_policy = policy;
        self
    }

    /// Worker pool for the build and compute-configuration fan-outs.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Remote-configuration plan; defaults to [`default_plan`].
    pub fn with_plan(mut self, plan: ConfigurePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Show a console activity indicator during the build.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Builds the lab end to end.
    ///
    /// Fails before creating anything when the shape, quota, flavor,
    /// image, or network cannot be settled. After the fan-out the build
    /// fails if either controller is missing or no compute survived;
    /// partial results up to that point are already in the ledger.
    pub async fn build(&self, request: &BuildRequest) -> Result<BuildReport, OrchestratorError> {
        if request.node_count < MIN_NODES {
            return Err(PlanError::NotEnoughNodes {
                requested: request.node_count,
            }
            .into());
        }

        info!(lab = %request.lab, nodes = request.node_count, "Starting lab build");

        let limits = self
            .list_policy
            .run(|_| async { as_attempt(self.compute.get_limits().await) })
            .await
            .map_err(|e| OrchestratorError::LimitsUnavailable(e.to_string()))?;

        let networks = self
            .list_policy
            .run(|_| async { as_attempt(self.compute.list_networks().await) })
            .await
            .map_err(|e| OrchestratorError::from_retry("listing networks", e))?;
        let net_label = request.net_label();
        let needs_network = !networks.iter().any(|network| network.label == net_label);

        let purposed = request.purposed_ram_mb();
        info!(purposed_mb = purposed, "Checking build against quota");
        if !capacity::check_limits(&limits, purposed, needs_network)? {
            return Err(OrchestratorError::NotEnoughRam {
                purposed_mb: purposed,
                available_mb: capacity::available_ram_mb(&limits),
            });
        }

        info!("Finding flavors");
        let flavors = self
            .list_policy
            .run(|_| async { as_attempt(self.compute.list_flavors().await) })
            .await
            .map_err(|e| OrchestratorError::from_retry("listing flavors", e))?;
        let controller_flavor = resolve::pick_flavor(&flavors, request.controller_ram_mb)?;
        let compute_flavor = resolve::pick_flavor(&flavors, request.compute_ram_mb)?;

        info!("Finding image");
        let images = self
            .list_policy
            .run(|_| async { as_attempt(self.compute.list_images().await) })
            .await
            .map_err(|e| OrchestratorError::from_retry("listing images", e))?;
        let image = resolve::pick_image(&images, &request.image)?;

        info!(label = %net_label, "Settling the lab network");
        let network = resolve::ensure_network(
            self.compute.as_ref(),
            &limits,
            &net_label,
            &request.net_cidr,
            &self.list_policy,
        )
        .await?;

        let mut nics = vec![
            NicSpec {
                net_id: PUBLIC_NET_ID.to_string(),
            },
            NicSpec {
                net_id: network.id.clone(),
            },
        ];
        if request.attach_service_net {
            nics.push(NicSpec {
                net_id: SERVICE_NET_ID.to_string(),
            });
        }

        let key_name = match &request.key_name {
            Some(name) => self.resolve_keypair(name, request.key_file.as_deref()).await?,
            None => None,
        };

        let template = NodeTemplate {
            controller_flavor_id: controller_flavor.id.clone(),
            compute_flavor_id: compute_flavor.id.clone(),
            image_id: image.id.clone(),
            key_name,
            nics,
        };
        let plan = plan_nodes(&request.lab, request.node_count, &template)?;
        let planned_names: Vec<String> = plan
            .jobs
            .iter()
            .map(|job| job.node_name.clone())
            .collect();

        let built = self.run_build_phase(request, plan.jobs).await;
        let abandoned: Vec<String> = planned_names
            .into_iter()
            .filter(|name| !built.iter().any(|node| &node.name == name))
            .collect();
        if !abandoned.is_empty() {
            warn!(nodes = ?abandoned, "Some nodes were abandoned");
        }

        let controllers_built = built
            .iter()
            .filter(|node| node.name.contains("_controller"))
            .count();
        if controllers_built < 2 {
            error!(built = controllers_built, "Lab is missing a controller");
            return Err(OrchestratorError::ControllersIncomplete {
                built: controllers_built,
            });
        }
        if !built.iter().any(|node| node.name.contains("_compute")) {
            return Err(OrchestratorError::NoComputeNodes);
        }

        info!("Configuring the lab");
        let configurator = Configurator::new(
            Arc::clone(&self.shell),
            request.lab.clone(),
            net_label,
            self.ledger_path.clone(),
            self.plan.clone(),
        )
        .with_pool(self.pool.clone());
        let spinner = self
            .show_progress
            .then(|| Spinner::start("Configuring nodes"));
        let outcome = configurator.configure(&built).await;
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }
        outcome?;

        info!(
            lab = %request.lab,
            built = built.len(),
            abandoned = abandoned.len(),
            "Lab build finished"
        );
        Ok(BuildReport {
            lab: request.lab.clone(),
            built,
            abandoned,
        })
    }

    /// Fans the job descriptors out over the worker pool and collects
    /// every node that reached ACTIVE.
    async fn run_build_phase(
        &self,
        request: &BuildRequest,
        jobs: Vec<JobDescriptor>,
    ) -> Vec<BuiltNode> {
        let queue = WorkQueue::new(jobs);
        let (results_tx, mut results_rx) = mpsc::channel(request.node_count);
        let builder = NodeBuilder::new(
            Arc::clone(&self.compute),
            queue.clone(),
            results_tx,
            request.lab.clone(),
            self.ledger_path.clone(),
            self.lifecycle,
        );

        info!(nodes = request.node_count, "Building nodes");
        let spinner = self
            .show_progress
            .then(|| Spinner::start_with_queue("Building nodes", queue.clone()));
        self.pool
            .run(queue, builder, |job, builder: NodeBuilder<C>| async move {
                builder.create_and_wait(job).await;
            })
            .await;
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }

        let mut built = Vec::new();
        while let Some(node) = results_rx.recv().await {
            built.push(node);
        }
        built
    }

    /// Settles the keypair for the build: an already registered key is
    /// used as-is; otherwise the public key file is registered under the
    /// name. Without either, the build proceeds keyless.
    async fn resolve_keypair(
        &self,
        name: &str,
        key_file: Option<&Path>,
    ) -> Result<Option<String>, OrchestratorError> {
        if let Some(path) = key_file {
            match tokio::fs::read_to_string(path).await {
                Ok(public_key) => {
                    resolve::ensure_keypair(
                        self.compute.as_ref(),
                        name,
                        public_key.trim_end(),
                        &self.list_policy,
                    )
                    .await?;
                    return Ok(Some(name.to_string()));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Key file unreadable, checking the registry");
                }
            }
        }

        let registered = self
            .list_policy
            .run(|_| async { as_attempt(self.compute.find_keypairs(name).await) })
            .await
            .map_err(|e| OrchestratorError::from_retry("listing keypairs", e))?;
        if registered.is_empty() {
            warn!(name, "Keypair not registered; building without key injection");
            Ok(None)
        } else {
            Ok(Some(name.to_string()))
        }
    }
}
