//! Integration tests for the chaosbernie control socket
//!
//! These run the real listener on a temporary Unix socket with a recording
//! action runner in place of the cloud CLI.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chaosbernie_protocol::Request;
use chaosbernie_server::config::ActionsConfig;
use chaosbernie_server::inventory::parse_inventory;
use chaosbernie_server::{
    ActionExecutor, ActionMode, ActionRunner, ControlServer, Dispatcher, Registry, Resource,
    ResourceStatus, Result, StatusObserver,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

const INVENTORY: &str = r#"[
    {"name": "vm1", "type": "Microsoft.Compute/virtualMachines", "resourceGroup": "rg1"},
    {"name": "vm2", "type": "Microsoft.Compute/virtualMachines", "resourceGroup": "rg1"},
    {"name": "rg2", "type": "Microsoft.Resources/Subscriptions/ResourceGroups", "resourceGroup": "rg2"}
]"#;

#[derive(Default)]
struct RecordingRunner {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionRunner for RecordingRunner {
    async fn run(&self, command: &str) -> Result<()> {
        self.commands.lock().unwrap().push(command.to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

/// Status history per pid, in commit order
#[derive(Default)]
struct History {
    transitions: Mutex<Vec<(u32, ResourceStatus)>>,
    last: Mutex<Vec<ResourceStatus>>,
}

impl StatusObserver for History {
    fn on_status_change(&self, resources: &[Resource]) {
        let mut last = self.last.lock().unwrap();
        if last.is_empty() {
            *last = resources.iter().map(|r| r.status).collect();
            return;
        }
        for (i, r) in resources.iter().enumerate() {
            if last[i] != r.status {
                self.transitions.lock().unwrap().push((r.pid, r.status));
                last[i] = r.status;
            }
        }
    }
}

impl History {
    fn of(&self, pid: u32) -> Vec<ResourceStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, s)| *s)
            .collect()
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    socket: PathBuf,
    registry: Arc<Registry>,
    runner: Arc<RecordingRunner>,
    history: Arc<History>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start(mode: ActionMode) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bernie.sock");

        let history = Arc::new(History::default());
        let records = parse_inventory(INVENTORY).unwrap();
        let registry = Arc::new(Registry::load(&records, mode, history.clone()));
        let runner = Arc::new(RecordingRunner::default());
        let config = ActionsConfig {
            mode,
            ..Default::default()
        };
        let executor = Arc::new(ActionExecutor::new(registry.clone(), runner.clone(), &config));
        let dispatcher = Arc::new(Dispatcher::new(
            executor,
            Vec::new(),
            Duration::from_secs(2),
        ));

        let server = ControlServer::bind(&socket, dispatcher).unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let server = tokio::spawn(async move {
            server.run(token).await.unwrap();
        });

        Self {
            _dir: dir,
            socket,
            registry,
            runner,
            history,
            cancel,
            server,
        }
    }

    async fn kill(&self, pid: u32) {
        chaosbernie_client::send_request(&self.socket, &Request::kill(pid))
            .await
            .unwrap();
    }

    async fn wait_for(&self, pid: u32, status: ResourceStatus) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.registry.find(pid).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pid {pid} never reached {status}");
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.server.await.unwrap();
        assert!(!self.socket.exists());
    }
}

#[tokio::test]
async fn test_ps_reply() {
    let h = Harness::start(ActionMode::Deallocate).await;
    let reply = chaosbernie_client::query_raw(&h.socket).await.unwrap();
    assert_eq!(reply, "rg1 100 vm1 1\nrg1 101 vm2 1\nrg2 102 rg2 1\n");
    h.stop().await;
}

#[tokio::test]
async fn test_ps_delete_mode_marks_non_daemon() {
    let h = Harness::start(ActionMode::Delete).await;
    let procs = chaosbernie_client::query_processes(&h.socket).await.unwrap();
    assert_eq!(procs.len(), 3);
    assert!(procs.iter().all(|p| !p.daemon));
    h.stop().await;
}

#[tokio::test]
async fn test_kill_scenario() {
    let h = Harness::start(ActionMode::Deallocate).await;

    h.kill(100).await;
    h.wait_for(100, ResourceStatus::Dead).await;

    assert_eq!(
        h.history.of(100),
        vec![ResourceStatus::Shot, ResourceStatus::Dead]
    );
    assert_eq!(
        *h.runner.commands.lock().unwrap(),
        vec!["az vm deallocate --resource-group rg1 --name vm1".to_string()]
    );

    let procs = chaosbernie_client::query_processes(&h.socket).await.unwrap();
    let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![101, 102]);
    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_duplicate_kills() {
    let h = Harness::start(ActionMode::Deallocate).await;

    tokio::join!(h.kill(100), h.kill(100));
    h.wait_for(100, ResourceStatus::Dead).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.runner.commands.lock().unwrap().len(), 1);
    assert_eq!(
        h.history.of(100),
        vec![ResourceStatus::Shot, ResourceStatus::Dead]
    );
    h.stop().await;
}

#[tokio::test]
async fn test_kill_unknown_pid_changes_nothing() {
    let h = Harness::start(ActionMode::Deallocate).await;

    h.kill(999).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.runner.commands.lock().unwrap().is_empty());
    assert!(h.registry.snapshot().await.iter().all(|r| r.is_alive()));
    // still serving
    assert_eq!(
        chaosbernie_client::query_processes(&h.socket).await.unwrap().len(),
        3
    );
    h.stop().await;
}

#[tokio::test]
async fn test_silent_client_is_dropped() {
    let h = Harness::start(ActionMode::Deallocate).await;

    let started = Instant::now();
    let mut stream = UnixStream::connect(&h.socket).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server should close a silent connection")
        .unwrap();

    assert!(reply.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(h.registry.snapshot().await.iter().all(|r| r.is_alive()));
    h.stop().await;
}

#[tokio::test]
async fn test_malformed_request_gets_no_reply() {
    let h = Harness::start(ActionMode::Deallocate).await;

    for raw in [&b"no separator"[..], b"|100", b"kill|abc", b"launch|100"] {
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty(), "reply to {:?}", String::from_utf8_lossy(raw));
    }

    assert!(h.runner.commands.lock().unwrap().is_empty());
    assert!(h.registry.snapshot().await.iter().all(|r| r.is_alive()));
    h.stop().await;
}

#[tokio::test]
async fn test_group_deallocate_is_unsupported_but_completes() {
    let h = Harness::start(ActionMode::Deallocate).await;

    h.kill(102).await;
    h.wait_for(102, ResourceStatus::Dead).await;
    assert!(h.runner.commands.lock().unwrap().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_group_delete_command() {
    let h = Harness::start(ActionMode::Delete).await;

    h.kill(102).await;
    h.wait_for(102, ResourceStatus::Dead).await;
    assert_eq!(
        *h.runner.commands.lock().unwrap(),
        vec!["az group delete -y --resource-group rg2".to_string()]
    );
    h.stop().await;
}

#[tokio::test]
async fn test_socket_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let h = Harness::start(ActionMode::Deallocate).await;
    let mode = std::fs::metadata(&h.socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    h.stop().await;
}

#[tokio::test]
async fn test_stale_socket_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("bernie.sock");
    std::fs::write(&socket, b"stale").unwrap();

    let records = parse_inventory(INVENTORY).unwrap();
    let registry = Arc::new(Registry::load(
        &records,
        ActionMode::Deallocate,
        Arc::new(chaosbernie_server::NoopObserver),
    ));
    let executor = Arc::new(ActionExecutor::new(
        registry,
        Arc::new(RecordingRunner::default()),
        &ActionsConfig::default(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(executor, Vec::new(), Duration::from_secs(2)));
    let server = ControlServer::bind(&socket, dispatcher).unwrap();
    assert_eq!(server.path(), socket.as_path());
}
