//! chaosbernie control-channel client

use std::path::Path;

use anyhow::{Context, Result};
use chaosbernie_protocol::{ProcessLine, Request, READ_DEADLINE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Send `ps|` and return the raw reply, read until EOF or the deadline
pub async fn query_raw(socket: &Path) -> Result<String> {
    let mut stream = connect(socket).await?;
    stream
        .write_all(Request::ps().encode().as_bytes())
        .await
        .context("Failed to send ps request")?;

    let mut reply = String::new();
    tokio::time::timeout(READ_DEADLINE, stream.read_to_string(&mut reply))
        .await
        .context("Timed out waiting for ps reply")?
        .context("Failed to read ps reply")?;
    Ok(reply)
}

/// Live processes as reported by the daemon
pub async fn query_processes(socket: &Path) -> Result<Vec<ProcessLine>> {
    let reply = query_raw(socket).await?;
    reply
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.parse::<ProcessLine>().map_err(anyhow::Error::from))
        .collect()
}

/// Fire-and-forget a destructive request. The daemon never answers these.
pub async fn send_request(socket: &Path, request: &Request) -> Result<()> {
    let mut stream = connect(socket).await?;
    stream
        .write_all(request.encode().as_bytes())
        .await
        .with_context(|| format!("Failed to send {} request", request.action))?;
    stream.shutdown().await.ok();
    Ok(())
}

async fn connect(socket: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket)
        .await
        .with_context(|| format!("Failed to connect to {}", socket.display()))
}
