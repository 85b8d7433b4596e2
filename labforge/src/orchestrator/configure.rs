//! Remote configuration of built nodes.
//!
//! Runs after every surviving node is ACTIVE. The first controller is
//! configured alone: it generates cluster material that the rest of the
//! lab consumes, and what it generates is pulled back into the ledger
//! and into the substitution context. The second controller follows,
//! then every compute node in parallel.
//!
//! Steps are templates: `{key}` placeholders are replaced from the
//! context before anything touches a node. Built-in keys are `{lab}`,
//! `{node}`, `{node_ip}`, `{controller1_ip}`, `{controller2_ip}` and
//! `{controller1_lab_ip}`; every fetch adds its ledger key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::error::OrchestratorError;
use crate::build::BuiltNode;
use crate::compute::{ServerRecord, PUBLIC_ADDRESS_NET};
use crate::ledger::{Ledger, LedgerEntry, LedgerError};
use crate::pool::WorkerPool;
use crate::queue::WorkQueue;
use crate::remote::{RemoteError, RemoteShell};

/// One templated action against a node.
#[derive(Debug, Clone)]
pub enum ConfigStep {
    /// Run a shell command.
    Run { description: String, command: String },
    /// Upload rendered content to a file.
    Put {
        description: String,
        content: String,
        remote_path: String,
    },
    /// Pull a file back; its content lands in the ledger under
    /// `ledger_key` and becomes a `{ledger_key}` placeholder.
    Fetch {
        description: String,
        remote_path: String,
        ledger_key: String,
    },
}

impl ConfigStep {
    pub fn run(description: &str, command: &str) -> Self {
        ConfigStep::Run {
            description: description.to_string(),
            command: command.to_string(),
        }
    }

    pub fn put(description: &str, content: &str, remote_path: &str) -> Self {
        ConfigStep::Put {
            description: description.to_string(),
            content: content.to_string(),
            remote_path: remote_path.to_string(),
        }
    }

    pub fn fetch(description: &str, remote_path: &str, ledger_key: &str) -> Self {
        ConfigStep::Fetch {
            description: description.to_string(),
            remote_path: remote_path.to_string(),
            ledger_key: ledger_key.to_string(),
        }
    }

    fn description(&self) -> &str {
        match self {
            ConfigStep::Run { description, .. }
            | ConfigStep::Put { description, .. }
            | ConfigStep::Fetch { description, .. } => description,
        }
    }
}

/// Step sequences per node role.
#[derive(Debug, Clone, Default)]
pub struct ConfigurePlan {
    pub controller1: Vec<ConfigStep>,
    pub controller2: Vec<ConfigStep>,
    pub compute: Vec<ConfigStep>,
}

/// Manifest written to every node.
const NODE_MANIFEST: &str = "lab = {lab}\n\
    node = {node}\n\
    address = {node_ip}\n\
    controller1 = {controller1_ip}\n\
    controller2 = {controller2_ip}\n\
    token = {cluster_token}\n";

/// The stock bootstrap plan.
///
/// The first controller generates the cluster token; everyone, itself
/// included, gets the rendered manifest and a readiness marker.
pub fn default_plan() -> ConfigurePlan {
    let manifest = ConfigStep::put("Node manifest", NODE_MANIFEST, "/etc/lab/node.conf");
    let ready = ConfigStep::run("Mark ready", "touch /etc/lab/ready");

    ConfigurePlan {
        controller1: vec![
            ConfigStep::run("Base directories", "mkdir -p /opt /etc/lab"),
            ConfigStep::run(
                "Host keys",
                "if [ ! -f /root/.ssh/id_rsa ]; then \
                 ssh-keygen -t rsa -f /root/.ssh/id_rsa -N '' && \
                 cat /root/.ssh/id_rsa.pub >> /root/.ssh/authorized_keys; fi",
            ),
            ConfigStep::run(
                "Cluster token",
                "if [ ! -f /etc/lab/cluster.token ]; then \
                 head -c 16 /dev/urandom | od -An -tx1 | tr -d ' \\n' \
                 > /etc/lab/cluster.token; fi",
            ),
            ConfigStep::fetch("Cluster token", "/etc/lab/cluster.token", "cluster_token"),
            manifest.clone(),
            ready.clone(),
        ],
        controller2: vec![
            ConfigStep::run("Base directories", "mkdir -p /opt /etc/lab"),
            manifest.clone(),
            ready.clone(),
        ],
        compute: vec![
            ConfigStep::run("Base directories", "mkdir -p /opt /etc/lab"),
            manifest,
            ready,
        ],
    }
}

/// A node with its reachable address resolved.
#[derive(Debug, Clone)]
pub struct NodeTarget {
    pub name: String,
    pub host: String,
}

impl NodeTarget {
    /// Resolves the address to configure a node through: its public
    /// IPv4, or failing that the first IPv4 on any network.
    pub fn from_record(record: &ServerRecord) -> Option<NodeTarget> {
        let host = record
            .ipv4_on(PUBLIC_ADDRESS_NET)
            .map(str::to_string)
            .or_else(|| {
                record
                    .addresses
                    .values()
                    .flatten()
                    .find(|address| address.version == 4)
                    .map(|address| address.addr.clone())
            })?;
        Some(NodeTarget {
            name: record.name.clone(),
            host,
        })
    }
}

/// Drives a [`ConfigurePlan`] across the built lab.
pub struct Configurator<R> {
    shell: Arc<R>,
    lab: String,
    net_label: String,
    ledger_path: PathBuf,
    plan: ConfigurePlan,
    pool: WorkerPool,
}

impl<R: RemoteShell + 'static> Configurator<R> {
    pub fn new(
        shell: Arc<R>,
        lab: impl Into<String>,
        net_label: impl Into<String>,
        ledger_path: impl Into<PathBuf>,
        plan: ConfigurePlan,
    ) -> Self {
        Self {
            shell,
            lab: lab.into(),
            net_label: net_label.into(),
            ledger_path: ledger_path.into(),
            plan,
            pool: WorkerPool::new(super::build::DEFAULT_CONCURRENCY),
        }
    }

    /// Worker pool used for the compute fan-out.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Configures the whole lab: first controller, second controller,
    /// then every compute node concurrently.
    ///
    /// A controller failure aborts immediately. Compute failures let the
    /// remaining computes finish, then the first failure is reported.
    pub async fn configure(&self, nodes: &[BuiltNode]) -> Result<(), OrchestratorError> {
        let (controller1, controller1_target) = self.find_controller(nodes, 1)?;
        let (_, controller2_target) = self.find_controller(nodes, 2)?;
        let computes: Vec<NodeTarget> = nodes
            .iter()
            .filter(|node| node.name.contains("_compute"))
            .map(|node| self.target_of(node))
            .collect::<Result<_, _>>()?;

        let mut context = BTreeMap::new();
        context.insert("lab".to_string(), self.lab.clone());
        context.insert(
            "controller1_ip".to_string(),
            controller1_target.host.clone(),
        );
        context.insert(
            "controller2_ip".to_string(),
            controller2_target.host.clone(),
        );
        let lab_ip = controller1
            .record
            .ipv4_on(&self.net_label)
            .unwrap_or(controller1_target.host.as_str());
        context.insert("controller1_lab_ip".to_string(), lab_ip.to_string());

        info!(node = %controller1_target.name, "Configuring first controller");
        self.run_steps(&controller1_target, &self.plan.controller1, &mut context)
            .await?;

        info!(node = %controller2_target.name, "Configuring second controller");
        self.run_steps(&controller2_target, &self.plan.controller2, &mut context)
            .await?;

        info!(count = computes.len(), "Configuring compute nodes");
        self.run_computes(computes, context).await
    }

    fn find_controller<'a>(
        &self,
        nodes: &'a [BuiltNode],
        number: u8,
    ) -> Result<(&'a BuiltNode, NodeTarget), OrchestratorError> {
        let wanted = format!("{}_controller{}", self.lab, number);
        let node = nodes
            .iter()
            .find(|node| node.name == wanted)
            .ok_or_else(|| OrchestratorError::ControllersIncomplete {
                built: nodes
                    .iter()
                    .filter(|node| node.name.contains("_controller"))
                    .count(),
            })?;
        let target = self.target_of(node)?;
        Ok((node, target))
    }

    fn target_of(&self, node: &BuiltNode) -> Result<NodeTarget, OrchestratorError> {
        NodeTarget::from_record(&node.record).ok_or_else(|| OrchestratorError::NoAddress {
            node: node.name.clone(),
        })
    }

    /// Runs `steps` against one node, sequentially. Fetched values feed
    /// back into the shared context for the steps and phases after them.
    async fn run_steps(
        &self,
        target: &NodeTarget,
        steps: &[ConfigStep],
        context: &mut BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        context.insert("node".to_string(), target.name.clone());
        context.insert("node_ip".to_string(), target.host.clone());

        for step in steps {
            match apply_step(self.shell.as_ref(), target, step, context).await {
                Ok(Some((key, value))) => {
                    store_fetch(&self.ledger_path, &self.lab, &key, &value).await?;
                    // Ledger keeps the raw bytes; templates get them trimmed.
                    context.insert(key, value.trim_end().to_string());
                }
                Ok(None) => {}
                Err(remote_error) => {
                    error!(
                        node = %target.name,
                        step = step.description(),
                        error = %remote_error,
                        "Step failed"
                    );
                    return Err(OrchestratorError::Configure {
                        node: target.name.clone(),
                        error: remote_error,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fans the compute steps out over the worker pool. Fetches on
    /// compute nodes land in the ledger under `key.node` and do not
    /// join the shared context.
    async fn run_computes(
        &self,
        computes: Vec<NodeTarget>,
        context: BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        if computes.is_empty() {
            return Ok(());
        }

        let (failure_tx, mut failure_rx) = mpsc::channel(computes.len());
        let queue = WorkQueue::new(computes);
        let worker = ComputeWorker {
            shell: Arc::clone(&self.shell),
            steps: Arc::new(self.plan.compute.clone()),
            context: Arc::new(context),
            lab: self.lab.clone(),
            ledger_path: self.ledger_path.clone(),
            failures: failure_tx,
        };

        self.pool
            .run(queue, worker, configure_one_compute::<R>)
            .await;

        // The pool dropped every sender; recv drains without blocking.
        if let Some((node, remote_error)) = failure_rx.recv().await {
            return Err(OrchestratorError::Configure {
                node,
                error: remote_error,
            });
        }
        Ok(())
    }
}

struct ComputeWorker<R> {
    shell: Arc<R>,
    steps: Arc<Vec<ConfigStep>>,
    context: Arc<BTreeMap<String, String>>,
    lab: String,
    ledger_path: PathBuf,
    failures: mpsc::Sender<(String, RemoteError)>,
}

impl<R> Clone for ComputeWorker<R> {
    fn clone(&self) -> Self {
        Self {
            shell: Arc::clone(&self.shell),
            steps: Arc::clone(&self.steps),
            context: Arc::clone(&self.context),
            lab: self.lab.clone(),
            ledger_path: self.ledger_path.clone(),
            failures: self.failures.clone(),
        }
    }
}

/// Worker body for one compute node.
async fn configure_one_compute<R: RemoteShell>(target: NodeTarget, worker: ComputeWorker<R>) {
    let mut context = (*worker.context).clone();
    context.insert("node".to_string(), target.name.clone());
    context.insert("node_ip".to_string(), target.host.clone());

    for step in worker.steps.iter() {
        match apply_step(worker.shell.as_ref(), &target, step, &context).await {
            Ok(Some((key, value))) => {
                let scoped = format!("{}.{}", key, target.name);
                if let Err(ledger_error) =
                    store_fetch(&worker.ledger_path, &worker.lab, &scoped, &value).await
                {
                    error!(node = %target.name, error = %ledger_error, "Ledger write failed");
                }
            }
            Ok(None) => {}
            Err(remote_error) => {
                error!(
                    node = %target.name,
                    step = step.description(),
                    error = %remote_error,
                    "Step failed"
                );
                let _ = worker.failures.send((target.name.clone(), remote_error)).await;
                return;
            }
        }
    }
    info!(node = %target.name, "Node configured");
}

/// Applies one rendered step; a fetch yields its `(ledger_key, value)`.
async fn apply_step<R: RemoteShell>(
    shell: &R,
    target: &NodeTarget,
    step: &ConfigStep,
    context: &BTreeMap<String, String>,
) -> Result<Option<(String, String)>, RemoteError> {
    match step {
        ConfigStep::Run {
            description,
            command,
        } => {
            info!(node = %target.name, step = %description, "Running step");
            shell.run(&target.host, &render(command, context)).await?;
            Ok(None)
        }
        ConfigStep::Put {
            description,
            content,
            remote_path,
        } => {
            info!(node = %target.name, step = %description, "Uploading step");
            shell
                .put(
                    &target.host,
                    &render(content, context),
                    &render(remote_path, context),
                )
                .await?;
            Ok(None)
        }
        ConfigStep::Fetch {
            description,
            remote_path,
            ledger_key,
        } => {
            info!(node = %target.name, step = %description, "Fetching step");
            let bytes = shell
                .fetch(&target.host, &render(remote_path, context))
                .await?;
            let value = String::from_utf8_lossy(&bytes).to_string();
            Ok(Some((ledger_key.clone(), value)))
        }
    }
}

async fn store_fetch(
    ledger_path: &Path,
    lab: &str,
    key: &str,
    value: &str,
) -> Result<(), LedgerError> {
    let lab = lab.to_string();
    let key = key.to_string();
    let value = value.to_string();
    Ledger::update(ledger_path, move |ledger| {
        ledger.set(&lab, &key, LedgerEntry::text(value));
    })
    .await
}

/// Replaces every `{key}` placeholder with its context value.
fn render(template: &str, context: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in context {
        rendered = rendered.replace(&format!("{{{}}}", key), value);
    }
    rendered
}
