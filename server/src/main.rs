//! chaosbernied — cloud resources as a fake process table
//!
//! Responsibilities:
//! - Load the resource inventory into the process table
//! - Serve `ps` / `kill` / `renice` on a private Unix socket
//! - Run the cloud CLI for every resource that gets killed
//! - Keep `resources.gv` in step with resource status

use std::sync::Arc;

use anyhow::{Context, Result};
use chaosbernie_server::config::{BernieConfig, Cli};
use chaosbernie_server::graph::GraphWriter;
use chaosbernie_server::{
    ActionExecutor, ControlServer, Dispatcher, NoopObserver, Registry, ShellRunner,
    StatusObserver,
};
use clap::Parser;
use nix::sys::stat::{umask, Mode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BernieConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config.apply_cli(&cli);
    config.validate().context("Invalid configuration")?;

    init_logging(&config.server.log_level)?;
    info!("chaosbernied v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "action={} dry_run={} cli={}",
        config.actions.mode, config.actions.dry_run, config.actions.cli_binary
    );

    umask(Mode::from_bits_truncate(0o077));

    let observer: Arc<dyn StatusObserver> = if config.graph.enabled {
        Arc::new(GraphWriter::new(&config.graph.output))
    } else {
        Arc::new(NoopObserver)
    };

    let registry = Registry::from_inventory_file(&cli.file, config.actions.mode, observer)
        .with_context(|| format!("Failed to load inventory from {}", cli.file.display()))?;
    let registry = Arc::new(registry);

    let runner = Arc::new(ShellRunner::new(config.actions.timeout()));
    let executor = Arc::new(ActionExecutor::new(registry, runner, &config.actions));
    let dispatcher = Arc::new(Dispatcher::new(
        executor.clone(),
        config.actions.extra_actions.clone(),
        config.read_timeout(),
    ));

    let socket_path = config.socket_path();
    let server = ControlServer::bind(&socket_path, dispatcher)
        .with_context(|| format!("listen error on {}", socket_path.display()))?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    server.run(cancel).await.context("Control server failed")?;

    let in_flight = executor.in_flight();
    if in_flight > 0 {
        info!("Waiting for {in_flight} running action(s) to finish");
    }
    executor.drain().await;
    info!("chaosbernied stopped");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .init();
    Ok(())
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install signal handlers: {e}");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
    cancel.cancel();
}
