//! Lab teardown.
//!
//! Scuttling deletes every instance whose name carries the lab prefix,
//! plus any instance the ledger still records for the lab (a build that
//! crashed mid-run can leave entries for servers the provider list no
//! longer shows under the expected name). The lab's ledger entries go
//! last, so an interrupted teardown can be re-run.

use std::path::Path;

use tracing::info;

use super::error::OrchestratorError;
use crate::compute::{as_attempt, ComputeApi, ComputeError};
use crate::ledger::Ledger;
use crate::retry::{RetryError, RetryPolicy};

/// What a teardown removed.
#[derive(Debug)]
pub struct ScuttleReport {
    pub lab: String,
    /// Instances deleted on the provider.
    pub deleted: Vec<String>,
    /// Ledger-recorded instances the provider no longer had.
    pub vanished: Vec<String>,
}

/// Deletes every instance belonging to `lab` and clears its ledger entries.
///
/// Instances already gone on the provider side are tolerated and reported
/// in [`ScuttleReport::vanished`]; any other delete failure aborts the
/// teardown with the remaining ledger entries intact.
pub async fn scuttle_lab<C: ComputeApi>(
    compute: &C,
    ledger_path: &Path,
    lab: &str,
    policy: &RetryPolicy,
) -> Result<ScuttleReport, OrchestratorError> {
    let servers = policy
        .run(|_| async { as_attempt(compute.list_servers().await) })
        .await
        .map_err(|e| OrchestratorError::from_retry("listing servers", e))?;

    let prefix = format!("{}_", lab);
    let mut doomed: Vec<(String, String)> = servers
        .iter()
        .filter(|server| server.name.starts_with(&prefix))
        .map(|server| (server.name.clone(), server.id.clone()))
        .collect();

    let recorded_lab = lab.to_string();
    let recorded = Ledger::update(ledger_path, move |ledger| ledger.list(&recorded_lab)).await?;
    for (node, entry) in recorded {
        if let Some(record) = entry.as_server() {
            if !doomed.iter().any(|(_, id)| id == &record.id) {
                doomed.push((node, record.id.clone()));
            }
        }
    }

    info!(lab, instances = doomed.len(), "Scuttling lab");
    let mut deleted = Vec::new();
    let mut vanished = Vec::new();
    for (node, id) in doomed {
        let outcome = policy
            .run(|_| async { as_attempt(compute.delete_server(&id).await) })
            .await;
        match outcome {
            Ok(()) => {
                info!(node = %node, id = %id, "Deleted instance");
                deleted.push(node.clone());
            }
            Err(RetryError::Aborted(ComputeError::NotFound(_))) => {
                info!(node = %node, id = %id, "Instance was already gone");
                vanished.push(node.clone());
            }
            Err(e) => return Err(OrchestratorError::from_retry("deleting instance", e)),
        }
        let entry_lab = lab.to_string();
        Ledger::update(ledger_path, move |ledger| {
            ledger.delete(&entry_lab, &node);
        })
        .await?;
    }

    // Sweep entries for nodes neither list covered.
    let sweep_lab = lab.to_string();
    Ledger::update(ledger_path, move |ledger| {
        ledger.delete_lab(&sweep_lab);
    })
    .await?;

    info!(lab, deleted = deleted.len(), "Lab scuttled");
    Ok(ScuttleReport {
        lab: lab.to_string(),
        deleted,
        vanished,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::tests::MockCompute;
    use crate::compute::{ServerRecord, ServerStatus};
    use crate::ledger::LedgerEntry;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(name: &str, id: &str) -> ServerRecord {
        ServerRecord {
            id: id.to_string(),
            name: name.to_string(),
            status: ServerStatus::Active,
            addresses: BTreeMap::new(),
            admin_pass: None,
        }
    }

    fn ledger_at(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("ledger.json")
    }

    #[tokio::test]
    async fn test_only_instances_with_the_lab_prefix_are_deleted() {
        let dir = TempDir::new().unwrap();
        let compute = MockCompute::new()
            .with_server(record("alpha_compute1", "srv-1"))
            .with_server(record("alpha_controller1", "srv-2"))
            .with_server(record("bravo_compute1", "srv-3"));

        let report = scuttle_lab(&compute, &ledger_at(&dir), "alpha", &RetryPolicy::new(2))
            .await
            .unwrap();

        assert_eq!(report.deleted.len(), 2);
        assert!(report.deleted.contains(&"alpha_compute1".to_string()));
        assert!(report.deleted.contains(&"alpha_controller1".to_string()));
        assert_eq!(compute.deleted_ids(), vec!["srv-1", "srv-2"]);

        let survivors = compute.list_servers().await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].name, "bravo_compute1");
    }

    #[tokio::test]
    async fn test_scuttle_clears_the_ledger() {
        let dir = TempDir::new().unwrap();
        let path = ledger_at(&dir);
        let compute = MockCompute::new().with_server(record("alpha_compute1", "srv-1"));
        Ledger::update(&path, |ledger| {
            ledger.set(
                "alpha",
                "alpha_compute1",
                LedgerEntry::server(record("alpha_compute1", "srv-1")),
            );
            ledger.set("alpha", "cluster_token", LedgerEntry::text("s3cr3t"));
        })
        .await
        .unwrap();

        scuttle_lab(&compute, &path, "alpha", &RetryPolicy::new(2))
            .await
            .unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.labs().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_stray_is_reported_vanished() {
        let dir = TempDir::new().unwrap();
        let path = ledger_at(&dir);
        let compute = MockCompute::new().with_server(record("alpha_compute1", "srv-1"));
        // A crashed build left a record for an instance the provider
        // no longer knows.
        Ledger::update(&path, |ledger| {
            ledger.set(
                "alpha",
                "alpha_ghost",
                LedgerEntry::server(record("alpha_ghost", "srv-99")),
            );
        })
        .await
        .unwrap();

        let report = scuttle_lab(&compute, &path, "alpha", &RetryPolicy::new(2))
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["alpha_compute1"]);
        assert_eq!(report.vanished, vec!["alpha_ghost"]);
        // The delete was still attempted.
        assert!(compute.deleted_ids().contains(&"srv-99".to_string()));
        assert!(Ledger::open(&path).unwrap().labs().is_empty());
    }

    #[tokio::test]
    async fn test_scuttling_an_unknown_lab_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let compute = MockCompute::new();

        let report = scuttle_lab(&compute, &ledger_at(&dir), "alpha", &RetryPolicy::new(2))
            .await
            .unwrap();

        assert!(report.deleted.is_empty());
        assert!(report.vanished.is_empty());
        assert!(compute.deleted_ids().is_empty());
    }
}
