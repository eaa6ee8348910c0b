//! Lifecycle guarantees under concurrent load
//!
//! Many executors race over a shared registry while readers keep taking
//! snapshots. Each resource must be acted on exactly once and no reader may
//! ever see a status go backward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chaosbernie_server::config::ActionsConfig;
use chaosbernie_server::inventory::InventoryRecord;
use chaosbernie_server::{
    ActionExecutor, ActionMode, ActionRunner, BernieError, NoopObserver, Registry,
    ResourceStatus, Result,
};

const RESOURCES: u32 = 20;

#[derive(Default)]
struct CountingRunner {
    per_command: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl ActionRunner for CountingRunner {
    async fn run(&self, command: &str) -> Result<()> {
        *self
            .per_command
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default() += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        if command.contains("--name vm3 ") {
            return Err(BernieError::ExternalActionFailure("exit status: 1".into()));
        }
        Ok(())
    }
}

fn inventory() -> Vec<InventoryRecord> {
    (0..RESOURCES)
        .map(|i| InventoryRecord {
            id: format!("/subscriptions/x/vm{i}"),
            location: "uksouth".into(),
            name: format!("vm{i}"),
            time_created: None,
            resource_type: "Microsoft.Compute/virtualMachines".into(),
            vm_id: String::new(),
            resource_group: format!("rg{}", i % 3),
        })
        .collect()
}

#[tokio::test]
async fn test_load_round_trip() {
    let registry = Registry::load(&inventory(), ActionMode::Deallocate, Arc::new(NoopObserver));
    let snapshot = registry.snapshot().await;
    assert_eq!(snapshot.len(), RESOURCES as usize);
    for (i, r) in snapshot.iter().enumerate() {
        assert_eq!(r.pid, 100 + i as u32);
        assert_eq!(r.name, format!("vm{i}"));
        assert_eq!(r.status, ResourceStatus::Alive);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_at_most_one_action_per_resource() {
    let registry = Arc::new(Registry::load(
        &inventory(),
        ActionMode::Delete,
        Arc::new(NoopObserver),
    ));
    let runner = Arc::new(CountingRunner::default());
    let config = ActionsConfig {
        mode: ActionMode::Delete,
        ..Default::default()
    };
    let executor = Arc::new(ActionExecutor::new(registry.clone(), runner.clone(), &config));

    let reader = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut last = vec![ResourceStatus::Alive; RESOURCES as usize];
            loop {
                let snapshot = registry.snapshot().await;
                for (i, r) in snapshot.iter().enumerate() {
                    assert!(r.status >= last[i], "pid {} went backward", r.pid);
                    last[i] = r.status;
                }
                if last.iter().all(|s| *s == ResourceStatus::Dead) {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    // every pid requested four times, interleaved
    let mut handles = Vec::new();
    for _ in 0..4 {
        for pid in 100..100 + RESOURCES {
            let executor = executor.clone();
            handles.push(tokio::spawn(async move { executor.execute(pid).await }));
        }
    }

    let mut accepted = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(BernieError::DuplicateAction { .. }) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("reader never saw every resource dead")
        .unwrap();

    assert_eq!(accepted, RESOURCES);
    assert_eq!(duplicates, RESOURCES * 3);

    assert!(registry
        .snapshot()
        .await
        .iter()
        .all(|r| r.status == ResourceStatus::Dead));

    let counts = runner.per_command.lock().unwrap();
    assert_eq!(counts.len(), RESOURCES as usize);
    assert!(counts.values().all(|n| *n == 1));
}
