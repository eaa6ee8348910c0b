//! Action Executor — shoots one resource
//!
//! Pipeline: look up → Alive→Shot (duplicate guard) → build cloud CLI
//! command → run (or sleep in dry-run) → Shot→Dead.
//!
//! Once a resource is `Shot` it always reaches `Dead`, whether the external
//! command succeeded, failed, timed out or was never built. Failures are
//! logged and never retried.
//!
//! A running cloud command is never killed on shutdown. Children are not
//! tied to the task that awaits them, and the daemon waits for tracked
//! actions via [`ActionExecutor::drain`] before exiting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ActionMode, ActionsConfig};
use crate::error::{BernieError, Result};
use crate::inventory::ResourceKind;
use crate::lifecycle::ResourceStatus;
use crate::registry::Registry;
use crate::resource::Resource;

/// Runs an external action command line
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<()>;
}

/// Runs commands through `bash -c` with the daemon's environment.
///
/// The child is only killed when the timeout expires; dropping the future
/// leaves it running.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ActionRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<()> {
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .spawn()
            .map_err(|e| BernieError::ExternalActionFailure(format!("failed to spawn: {e}")))?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed out action: {e}");
                    }
                    return Err(BernieError::ExternalActionFailure(format!(
                        "timed out after {limit:?}"
                    )));
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| BernieError::ExternalActionFailure(format!("failed to wait: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(BernieError::ExternalActionFailure(format!(
                "exited with {status}"
            )))
        }
    }
}

/// Cloud CLI command for `resource`, or `None` when the kind/mode pair has no
/// supported action
pub fn build_command(cli: &str, resource: &Resource, mode: ActionMode) -> Option<String> {
    match (&resource.kind, mode) {
        (ResourceKind::VirtualMachine, _) => {
            let mut cmd = format!(
                "{cli} vm {mode} --resource-group {} --name {}",
                resource.owner, resource.name
            );
            if mode == ActionMode::Delete {
                cmd.push_str(" -y --force-deletion true");
            }
            Some(cmd)
        }
        (ResourceKind::ResourceGroup, ActionMode::Delete) => Some(format!(
            "{cli} group delete -y --resource-group {}",
            resource.name
        )),
        _ => None,
    }
}

/// How a single execution ended once the resource was shot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Failed(String),
    Unsupported,
    DryRun,
}

pub struct ActionExecutor {
    registry: Arc<Registry>,
    runner: Arc<dyn ActionRunner>,
    mode: ActionMode,
    cli_binary: String,
    dry_run: bool,
    dry_run_delay: Duration,
    tasks: TaskTracker,
}

impl ActionExecutor {
    pub fn new(
        registry: Arc<Registry>,
        runner: Arc<dyn ActionRunner>,
        config: &ActionsConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            mode: config.mode,
            cli_binary: config.cli_binary.clone(),
            dry_run: config.dry_run,
            dry_run_delay: config.dry_run_delay(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Shoot `pid` and drive it to `Dead`.
    ///
    /// Errors before the `Shot` transition (`NotFound`, `DuplicateAction`)
    /// leave the registry untouched. After it, the result is always `Ok` and
    /// the outcome says what happened to the external action.
    pub async fn execute(&self, pid: u32) -> Result<ActionOutcome> {
        let resource = self.registry.find(pid).await?;
        debug!("{resource:?}");
        let resource = self.registry.set_status(resource.pid, ResourceStatus::Shot).await?;

        let outcome = self.perform(&resource).await;

        self.registry.set_status(pid, ResourceStatus::Dead).await?;
        info!("pid {pid} ({}) is dead: {outcome:?}", resource.name);
        Ok(outcome)
    }

    async fn perform(&self, resource: &Resource) -> ActionOutcome {
        let Some(cmd) = build_command(&self.cli_binary, resource, self.mode) else {
            warn!(
                "no valid {} action for {} ({:?}), skipping",
                self.mode, resource.name, resource.kind
            );
            return ActionOutcome::Unsupported;
        };

        debug!("Running: {cmd}");
        if self.dry_run {
            warn!("dry run, skipping execution of: {cmd}");
            tokio::time::sleep(self.dry_run_delay).await;
            return ActionOutcome::DryRun;
        }

        match self.runner.run(&cmd).await {
            Ok(()) => ActionOutcome::Completed,
            Err(e) => {
                error!("{cmd}: {e}");
                ActionOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fire-and-forget: run [`execute`](Self::execute) on its own task and
    /// log anything that stops it
    pub fn spawn(self: &Arc<Self>, pid: u32) -> tokio::task::JoinHandle<()> {
        let executor = Arc::clone(self);
        self.tasks.spawn(async move {
            match executor.execute(pid).await {
                Ok(_) => {}
                Err(e @ BernieError::DuplicateAction { .. }) => warn!("{e}"),
                Err(e) => error!("{e}"),
            }
        })
    }

    /// Actions spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every spawned action to reach `Dead`
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}
