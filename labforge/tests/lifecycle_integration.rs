//! Integration tests for the per-node provisioning lifecycle.
//!
//! These tests run real job descriptors through the worker pool and a
//! scripted compute provider, verifying:
//! - A fleet of nodes builds to ACTIVE and lands in the ledger
//! - An ERROR instance is deleted and rebuilt with the same parameters
//! - An instance that never settles is deleted and not requeued
//! - Create exhaustion abandons the node without touching the provider
//! - The requeue ceiling bounds how often a node is rebuilt

use labforge::build::{JobDescriptor, LifecyclePolicy, NodeBuilder};
use labforge::compute::{
    ComputeApi, ComputeError, Flavor, Image, KeyPair, Network, NewServer, NicSpec, QuotaLimits,
    ServerAddress, ServerRecord, ServerStatus,
};
use labforge::ledger::{Ledger, LedgerEntry};
use labforge::pool::WorkerPool;
use labforge::queue::WorkQueue;
use labforge::retry::RetryPolicy;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

// =============================================================================
// Test Helpers
// =============================================================================

/// Scripted in-memory compute provider shared by a whole pool of builders.
///
/// Instance behavior is keyed by node name: how many create calls fail
/// first and which status sequence successive polls observe. Every create
/// request and delete call is recorded for assertions.
#[derive(Default)]
struct ScriptedCompute {
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    servers: HashMap<String, ServerRecord>,
    status_scripts: HashMap<String, VecDeque<ServerStatus>>,
    create_failures: HashMap<String, u32>,
    create_requests: Vec<NewServer>,
    deleted: Vec<String>,
    next_id: u32,
}

impl ScriptedCompute {
    fn new() -> Self {
        Self::default()
    }

    /// Makes the first `count` create calls for `name` fail with a
    /// transport error.
    fn fail_creates(&self, name: &str, count: u32) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(name.to_string(), count);
    }

    /// Scripts the status sequence successive polls of `name` observe.
    /// Once the script runs out, the last applied status repeats.
    fn script_statuses(&self, name: &str, statuses: impl IntoIterator<Item = ServerStatus>) {
        self.state
            .lock()
            .unwrap()
            .status_scripts
            .insert(name.to_string(), statuses.into_iter().collect());
    }

    fn deleted_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Create requests seen for `name`, in call order, failed ones included.
    fn create_requests(&self, name: &str) -> Vec<NewServer> {
        self.state
            .lock()
            .unwrap()
            .create_requests
            .iter()
            .filter(|request| request.name == name)
            .cloned()
            .collect()
    }
}

impl ComputeApi for ScriptedCompute {
    async fn create_server(&self, request: &NewServer) -> Result<ServerRecord, ComputeError> {
        let mut state = self.state.lock().unwrap();
        state.create_requests.push(request.clone());

        if let Some(failures) = state.create_failures.get_mut(&request.name) {
            if *failures > 0 {
                *failures -= 1;
                return Err(ComputeError::Transport("connection reset".to_string()));
            }
        }

        state.next_id += 1;
        let record = ServerRecord {
            id: format!("srv-{}", state.next_id),
            name: request.name.clone(),
            status: ServerStatus::Build,
            addresses: BTreeMap::new(),
            admin_pass: Some(format!("pass-{}", state.next_id)),
        };
        state.servers.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_server(&self, id: &str) -> Result<ServerRecord, ComputeError> {
        let mut state = self.state.lock().unwrap();
        let name = match state.servers.get(id) {
            Some(record) => record.name.clone(),
            None => return Err(ComputeError::NotFound(format!("server {}", id))),
        };

        if let Some(next) = state
            .status_scripts
            .get_mut(&name)
            .and_then(|script| script.pop_front())
        {
            let became_active = next == ServerStatus::Active;
            if let Some(record) = state.servers.get_mut(id) {
                record.status = next;
                if became_active && record.addresses.is_empty() {
                    record.addresses = lab_addresses();
                }
            }
        }

        state
            .servers
            .get(id)
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("server {}", id)))
    }

    async fn delete_server(&self, id: &str) -> Result<(), ComputeError> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(id.to_string());
        match state.servers.remove(id) {
            Some(_) => Ok(()),
            None => Err(ComputeError::NotFound(format!("server {}", id))),
        }
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, ComputeError> {
        Ok(self.state.lock().unwrap().servers.values().cloned().collect())
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>, ComputeError> {
        Ok(Vec::new())
    }

    async fn list_images(&self) -> Result<Vec<Image>, ComputeError> {
        Ok(Vec::new())
    }

    async fn list_networks(&self) -> Result<Vec<Network>, ComputeError> {
        Ok(Vec::new())
    }

    async fn create_network(&self, _label: &str, _cidr: &str) -> Result<Network, ComputeError> {
        Err(ComputeError::Malformed("not scripted".to_string()))
    }

    async fn get_limits(&self) -> Result<QuotaLimits, ComputeError> {
        Err(ComputeError::Malformed("not scripted".to_string()))
    }

    async fn find_keypairs(&self, _name: &str) -> Result<Vec<KeyPair>, ComputeError> {
        Ok(Vec::new())
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<KeyPair, ComputeError> {
        Ok(KeyPair {
            name: name.to_string(),
            public_key: public_key.to_string(),
        })
    }
}

/// Addresses a scripted server reports once it goes ACTIVE.
fn lab_addresses() -> BTreeMap<String, Vec<ServerAddress>> {
    let mut addresses = BTreeMap::new();
    addresses.insert(
        "alpha_net".to_string(),
        vec![ServerAddress {
            version: 4,
            addr: "192.168.3.10".to_string(),
        }],
    );
    addresses.insert(
        "public".to_string(),
        vec![ServerAddress {
            version: 4,
            addr: "203.0.113.10".to_string(),
        }],
    );
    addresses
}

fn job(name: &str) -> JobDescriptor {
    JobDescriptor::new(NewServer {
        name: name.to_string(),
        flavor_id: "f-std".to_string(),
        image_id: "img-1".to_string(),
        key_name: Some("alpha-key".to_string()),
        nics: vec![NicSpec {
            net_id: "net-1".to_string(),
        }],
    })
}

fn quick_policy(requeue_ceiling: u32) -> LifecyclePolicy {
    LifecyclePolicy {
        create: RetryPolicy::new(3),
        poll: RetryPolicy::new(4),
        cleanup: RetryPolicy::new(2),
        requeue_ceiling,
        jitter_max_secs: 0,
    }
}

/// What a fan-out run left behind: reported nodes plus the ledger on disk.
struct FanoutResult {
    built_names: Vec<String>,
    built_ids: Vec<String>,
    ledger_path: PathBuf,
    _dir: TempDir,
}

/// Runs `jobs` through a three-worker pool of builders against `compute`,
/// the way the orchestrator fans out a build phase.
async fn run_fanout(
    compute: &Arc<ScriptedCompute>,
    jobs: Vec<JobDescriptor>,
    policy: LifecyclePolicy,
) -> FanoutResult {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join("ledger.json");
    let capacity = jobs.len().max(1);
    let queue = WorkQueue::new(jobs);
    let (results_tx, mut results_rx) = mpsc::channel(capacity);
    let builder = NodeBuilder::new(
        Arc::clone(compute),
        queue.clone(),
        results_tx,
        "alpha",
        ledger_path.clone(),
        policy,
    );

    let pool = WorkerPool::new(3)
        .with_pop_wait(Duration::from_millis(25))
        .with_stagger(Duration::ZERO);
    pool.run(queue, builder, |job, builder: NodeBuilder<ScriptedCompute>| async move {
        builder.create_and_wait(job).await;
    })
    .await;

    let mut built_names = Vec::new();
    let mut built_ids = Vec::new();
    while let Some(node) = results_rx.recv().await {
        built_names.push(node.name);
        built_ids.push(node.record.id);
    }
    built_names.sort();

    FanoutResult {
        built_names,
        built_ids,
        ledger_path,
        _dir: dir,
    }
}

fn recorded_status(path: &Path, node: &str) -> Option<ServerStatus> {
    let ledger = Ledger::open(path).unwrap();
    let status = ledger
        .get("alpha", node)
        .and_then(LedgerEntry::as_server)
        .map(|record| record.status.clone());
    ledger.close().unwrap();
    status
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fleet_of_nodes_builds_to_active() {
    let compute = Arc::new(ScriptedCompute::new());
    let names = [
        "alpha_compute1",
        "alpha_compute2",
        "alpha_compute3",
        "alpha_controller1",
        "alpha_controller2",
    ];
    for name in names {
        compute.script_statuses(name, [ServerStatus::Build, ServerStatus::Active]);
    }
    let jobs = names.iter().map(|name| job(name)).collect();

    let result = run_fanout(&compute, jobs, quick_policy(1)).await;

    assert_eq!(result.built_names, names);
    assert!(compute.deleted_ids().is_empty());
    for name in names {
        assert_eq!(
            recorded_status(&result.ledger_path, name),
            Some(ServerStatus::Active),
            "{name} missing from the ledger"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_errored_node_is_deleted_and_rebuilt_with_the_same_parameters() {
    let compute = Arc::new(ScriptedCompute::new());
    compute.script_statuses("alpha_compute1", [ServerStatus::Error, ServerStatus::Active]);

    let result = run_fanout(&compute, vec![job("alpha_compute1")], quick_policy(1)).await;

    let requests = compute.create_requests("alpha_compute1");
    assert_eq!(requests.len(), 2, "the node should be created twice");
    assert_eq!(requests[0], requests[1], "the rebuild changed parameters");

    let deleted = compute.deleted_ids();
    assert_eq!(deleted.len(), 1);
    assert_eq!(result.built_names, ["alpha_compute1"]);
    // The reported node is the second instance, not the deleted one.
    assert_ne!(result.built_ids[0], deleted[0]);
    assert_eq!(
        recorded_status(&result.ledger_path, "alpha_compute1"),
        Some(ServerStatus::Active)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_node_that_never_settles_is_deleted_and_not_requeued() {
    let compute = Arc::new(ScriptedCompute::new());
    // No script: the instance stays in BUILD until the poll budget runs out.

    let result = run_fanout(&compute, vec![job("alpha_compute1")], quick_policy(3)).await;

    assert_eq!(compute.create_requests("alpha_compute1").len(), 1);
    assert_eq!(compute.deleted_ids().len(), 1);
    assert!(result.built_names.is_empty());
    // The stale entry stays behind for inspection and a later scuttle.
    assert_eq!(
        recorded_status(&result.ledger_path, "alpha_compute1"),
        Some(ServerStatus::Build)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_exhaustion_abandons_the_node() {
    let compute = Arc::new(ScriptedCompute::new());
    compute.fail_creates("alpha_compute1", 5);

    let result = run_fanout(&compute, vec![job("alpha_compute1")], quick_policy(1)).await;

    // Three attempts allowed, all failed, nothing left to clean up.
    assert_eq!(compute.create_requests("alpha_compute1").len(), 3);
    assert!(compute.deleted_ids().is_empty());
    assert!(result.built_names.is_empty());
    assert_eq!(recorded_status(&result.ledger_path, "alpha_compute1"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requeue_ceiling_bounds_recovery() {
    let compute = Arc::new(ScriptedCompute::new());
    compute.script_statuses("alpha_compute1", [ServerStatus::Error, ServerStatus::Error]);

    let result = run_fanout(&compute, vec![job("alpha_compute1")], quick_policy(1)).await;

    // First ERROR earns the one allowed rebuild; the second exhausts it.
    assert_eq!(compute.create_requests("alpha_compute1").len(), 2);
    assert_eq!(compute.deleted_ids().len(), 2);
    assert!(result.built_names.is_empty());
    assert_eq!(recorded_status(&result.ledger_path, "alpha_compute1"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_fleet_reports_only_the_nodes_that_converged() {
    let compute = Arc::new(ScriptedCompute::new());
    compute.script_statuses("alpha_compute1", [ServerStatus::Active]);
    compute.script_statuses("alpha_compute2", [ServerStatus::Error, ServerStatus::Active]);
    // alpha_compute3 has no script and never leaves BUILD.
    compute.script_statuses(
        "alpha_controller1",
        [ServerStatus::Build, ServerStatus::Build, ServerStatus::Active],
    );
    let jobs = vec![
        job("alpha_compute1"),
        job("alpha_compute2"),
        job("alpha_compute3"),
        job("alpha_controller1"),
    ];

    let result = run_fanout(&compute, jobs, quick_policy(1)).await;

    assert_eq!(
        result.built_names,
        ["alpha_compute1", "alpha_compute2", "alpha_controller1"]
    );
    // compute2's first instance and compute3's only instance were deleted.
    assert_eq!(compute.deleted_ids().len(), 2);
    assert_eq!(
        recorded_status(&result.ledger_path, "alpha_compute2"),
        Some(ServerStatus::Active)
    );
    assert_eq!(
        recorded_status(&result.ledger_path, "alpha_compute3"),
        Some(ServerStatus::Build)
    );
}
