//! chaosbernie — talk to a running chaosbernied
//!
//! `chaosbernie` prints the live process table; `chaosbernie --action kill
//! <PID>` shoots one resource.

use std::path::PathBuf;

use anyhow::{bail, Result};
use chaosbernie_protocol::{default_socket_path, Action, Request};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ClientAction {
    Ps,
    Kill,
    Renice,
}

#[derive(Debug, Parser)]
#[command(name = "chaosbernie", version, about = "Query or kill chaosbernie resources")]
struct Args {
    /// Control socket, defaults to ~/.chaosbernie.sock
    #[arg(long = "socket", value_name = "PATH")]
    socket: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "ps")]
    action: ClientAction,

    /// Resource pid for kill/renice
    pid: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let socket = args.socket.unwrap_or_else(default_socket_path);

    let action = match args.action {
        ClientAction::Ps => {
            print!("{}", chaosbernie_client::query_raw(&socket).await?);
            return Ok(());
        }
        ClientAction::Kill => Action::Kill,
        ClientAction::Renice => Action::Renice,
    };

    let Some(pid) = args.pid else {
        bail!("{action} requires a pid");
    };
    info!("{action} {pid}");
    chaosbernie_client::send_request(&socket, &Request::with_pid(action, pid)).await
}
