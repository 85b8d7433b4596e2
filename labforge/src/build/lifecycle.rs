//! Per-node provisioning lifecycle.
//!
//! One [`NodeBuilder::create_and_wait`] call drives a single job from
//! descriptor to outcome: create the instance (retrying transient provider
//! failures), persist the snapshot to the ledger immediately, then poll
//! status until the instance is ACTIVE, the provider flags it ERROR, or the
//! poll budget runs out.
//!
//! Failure handling differs by phase on purpose:
//!
//! - create retries exhausted → the job is abandoned, bounding total work;
//! - ERROR while polling → the instance is deleted and the job goes back on
//!   the shared queue for a different worker, up to a per-job requeue
//!   ceiling;
//! - poll budget exhausted → the instance is deleted and the job abandoned;
//!   a node that never converges is not worth requeuing.
//!
//! Built nodes are reported over an explicit results channel; the ledger
//! records durable state only.

use super::job::JobDescriptor;
use crate::compute::{ComputeApi, ComputeError, ServerRecord, ServerStatus};
use crate::ledger::{Ledger, LedgerEntry};
use crate::queue::WorkQueue;
use crate::retry::{Attempt, RetryError, RetryPolicy};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Retry budgets and recovery bounds for one build.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
    /// Policy for the create-instance call.
    pub create: RetryPolicy,
    /// Policy for the status poll loop.
    pub poll: RetryPolicy,
    /// Policy for cleanup calls (delete, final state fetch).
    pub cleanup: RetryPolicy,
    /// Maximum times one job may be requeued after ERROR states.
    pub requeue_ceiling: u32,
    /// Upper bound (seconds) of the random pause before the first create
    /// call; zero disables the jitter.
    pub jitter_max_secs: u64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            create: RetryPolicy::new(10).with_delay(Duration::from_secs(5)),
            poll: RetryPolicy::new(100).with_delay(Duration::from_secs(5)),
            cleanup: RetryPolicy::new(5).with_delay(Duration::from_secs(2)),
            requeue_ceiling: 3,
            jitter_max_secs: 4,
        }
    }
}

/// A node that reached ACTIVE, reported to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltNode {
    /// Node name within the lab.
    pub name: String,
    /// Final instance snapshot, addresses included.
    pub record: ServerRecord,
}

/// Why a job was permanently given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The create call never succeeded within its attempt budget.
    CreateFailed,
    /// The instance never reached ACTIVE within the poll budget.
    NeverActive,
    /// Another ERROR state arrived after the job had already used up its
    /// requeue ceiling.
    RequeueCeilingReached,
}

/// Terminal state of one lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Node reached ACTIVE and was reported over the results channel.
    Active,
    /// The provider flagged the instance ERROR; it was deleted and a fresh
    /// descriptor was pushed for another worker.
    Requeued,
    /// The job was given up; no descriptor was pushed.
    Abandoned(AbandonReason),
}

/// What one status poll concluded.
enum PollScan {
    Active(ServerRecord),
    Errored(ServerRecord),
}

/// Drives the create → persist → poll lifecycle for queue jobs.
///
/// Cloneable across workers; every worker shares the same queue handle,
/// results channel, and ledger path.
pub struct NodeBuilder<C> {
    compute: Arc<C>,
    queue: WorkQueue<JobDescriptor>,
    results: mpsc::Sender<BuiltNode>,
    lab: String,
    ledger_path: PathBuf,
    policy: LifecyclePolicy,
}

impl<C> Clone for NodeBuilder<C> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            queue: self.queue.clone(),
            results: self.results.clone(),
            lab: self.lab.clone(),
            ledger_path: self.ledger_path.clone(),
            policy: self.policy,
        }
    }
}

impl<C: ComputeApi> NodeBuilder<C> {
    pub fn new(
        compute: Arc<C>,
        queue: WorkQueue<JobDescriptor>,
        results: mpsc::Sender<BuiltNode>,
        lab: impl Into<String>,
        ledger_path: PathBuf,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            compute,
            queue,
            results,
            lab: lab.into(),
            ledger_path,
            policy,
        }
    }

    /// Builds one node end to end and reports how it ended.
    ///
    /// Failures never escape to the caller: they are logged and either
    /// recovered or abandoned, so the worker pool can treat every job the
    /// same way.
    pub async fn create_and_wait(&self, job: JobDescriptor) -> BuildOutcome {
        if self.policy.jitter_max_secs > 0 {
            // Spread simultaneous create calls across a few seconds.
            let pause = {
                let mut rng = rand::thread_rng();
                rng.gen_range(1..=self.policy.jitter_max_secs)
            };
            tokio::time::sleep(Duration::from_secs(pause)).await;
        }

        let created = match self.create_instance(&job).await {
            Some(record) => record,
            None => return BuildOutcome::Abandoned(AbandonReason::CreateFailed),
        };
        self.persist(&job.node_name, created.clone()).await;

        match self.poll_until_settled(&job, &created).await {
            Ok(PollScan::Active(snapshot)) => {
                self.finish_active(&job, &created, snapshot).await;
                BuildOutcome::Active
            }
            Ok(PollScan::Errored(snapshot)) => self.recover_from_error(&job, &snapshot).await,
            Err(retry_error) => {
                error!(
                    node = %job.node_name,
                    id = %created.id,
                    error = %retry_error,
                    "Instance never reached ACTIVE, deleting"
                );
                self.delete_instance(&created.id, &job.node_name).await;
                BuildOutcome::Abandoned(AbandonReason::NeverActive)
            }
        }
    }

    /// Create call under the create policy. `None` means the job is over.
    async fn create_instance(&self, job: &JobDescriptor) -> Option<ServerRecord> {
        let compute = &self.compute;
        let request = &job.request;
        let node = job.node_name.as_str();

        let created = self
            .policy
            .create
            .run(|attempt| async move {
                match compute.create_server(request).await {
                    Ok(record) => Attempt::Done(record),
                    Err(error) if error.is_retryable() => {
                        warn!(node, attempt, error = %error, "Create failed, will retry");
                        Attempt::Retry
                    }
                    Err(error) => Attempt::Fail(error),
                }
            })
            .await;

        match created {
            Ok(record) => {
                info!(node, id = %record.id, "Instance created");
                Some(record)
            }
            Err(error) => {
                error!(node, error = %error, "Giving up on create");
                None
            }
        }
    }

    /// Polls status under the poll policy until ACTIVE or ERROR.
    async fn poll_until_settled(
        &self,
        job: &JobDescriptor,
        created: &ServerRecord,
    ) -> Result<PollScan, RetryError<ComputeError>> {
        let compute = &self.compute;
        let id = created.id.as_str();
        let node = job.node_name.as_str();

        self.policy
            .poll
            .run(|attempt| async move {
                match compute.get_server(id).await {
                    Ok(current) => match current.status {
                        ServerStatus::Active => Attempt::Done(PollScan::Active(current)),
                        ServerStatus::Error => Attempt::Done(PollScan::Errored(current)),
                        ref status => {
                            debug!(node, attempt, status = %status, "Still waiting");
                            Attempt::Retry
                        }
                    },
                    Err(error) if error.is_retryable() => {
                        warn!(node, attempt, error = %error, "Status poll failed, will retry");
                        Attempt::Retry
                    }
                    Err(error) => Attempt::Fail(error),
                }
            })
            .await
    }

    /// ACTIVE endgame: take a final snapshot, overwrite the ledger entry,
    /// and report the node over the results channel.
    async fn finish_active(
        &self,
        job: &JobDescriptor,
        created: &ServerRecord,
        polled: ServerRecord,
    ) {
        let compute = &self.compute;
        let id = created.id.as_str();
        let refreshed = self
            .policy
            .cleanup
            .run(|_| async move {
                match compute.get_server(id).await {
                    Ok(record) => Attempt::Done(record),
                    Err(error) if error.is_retryable() => Attempt::Retry,
                    Err(error) => Attempt::Fail(error),
                }
            })
            .await;

        let mut snapshot = match refreshed {
            Ok(record) => record,
            Err(error) => {
                // Fall back to the poll snapshot rather than losing the node.
                warn!(node = %job.node_name, error = %error, "Final state fetch failed");
                polled
            }
        };
        // Only the create call reports the admin password; carry it forward.
        if snapshot.admin_pass.is_none() {
            snapshot.admin_pass = created.admin_pass.clone();
        }

        info!(node = %job.node_name, id = %snapshot.id, "Instance active");
        self.persist(&job.node_name, snapshot.clone()).await;

        let built = BuiltNode {
            name: job.node_name.clone(),
            record: snapshot,
        };
        if self.results.send(built).await.is_err() {
            warn!(node = %job.node_name, "Results channel closed, node not reported");
        }
    }

    /// ERROR endgame: delete the instance, drop its ledger entry, and, if
    /// the ceiling allows, push a fresh descriptor for another worker.
    async fn recover_from_error(&self, job: &JobDescriptor, snapshot: &ServerRecord) -> BuildOutcome {
        warn!(
            node = %job.node_name,
            id = %snapshot.id,
            requeues = job.requeues,
            "Provider reports ERROR, deleting instance"
        );
        self.delete_instance(&snapshot.id, &job.node_name).await;
        self.forget(&job.node_name).await;

        if job.requeues >= self.policy.requeue_ceiling {
            error!(
                node = %job.node_name,
                requeues = job.requeues,
                "Requeue ceiling reached, abandoning node"
            );
            return BuildOutcome::Abandoned(AbandonReason::RequeueCeilingReached);
        }

        let retry_job = job.requeued();
        info!(
            node = %retry_job.node_name,
            requeues = retry_job.requeues,
            "Requeued for a fresh build"
        );
        self.queue.push(retry_job).await;
        BuildOutcome::Requeued
    }

    /// Deletes an instance under the cleanup policy. An instance that is
    /// already gone counts as deleted.
    async fn delete_instance(&self, id: &str, node: &str) {
        let compute = &self.compute;
        let result = self
            .policy
            .cleanup
            .run(|_| async move {
                match compute.delete_server(id).await {
                    Ok(()) => Attempt::Done(()),
                    Err(ComputeError::NotFound(_)) => Attempt::Done(()),
                    Err(error) if error.is_retryable() => Attempt::Retry,
                    Err(error) => Attempt::Fail(error),
                }
            })
            .await;

        if let Err(error) = result {
            warn!(node, id, error = %error, "Failed to delete instance");
        }
    }

    /// Persists an instance snapshot under this lab and node name.
    async fn persist(&self, node: &str, record: ServerRecord) {
        let lab = self.lab.clone();
        let node_key = node.to_string();
        let result = Ledger::update(&self.ledger_path, move |ledger| {
            ledger.set(&lab, &node_key, LedgerEntry::server(record));
        })
        .await;

        if let Err(error) = result {
            error!(node, error = %error, "Failed to persist instance record");
        }
    }

    /// Drops the ledger entry for a node whose instance was deleted.
    async fn forget(&self, node: &str) {
        let lab = self.lab.clone();
        let node_key = node.to_string();
        let result = Ledger::update(&self.ledger_path, move |ledger| {
            ledger.delete(&lab, &node_key);
        })
        .await;

        if let Err(error) = result {
            warn!(node, error = %error, "Failed to drop ledger entry");
        }
    }
}
