//! Control socket listener
//!
//! Accepts connections on the Unix socket and hands each one to the
//! dispatcher on its own task. The accept loop never waits on a handler.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dispatcher::Dispatcher;
use crate::error::{BernieError, Result};

const SOCKET_MODE: u32 = 0o600;

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
}

impl ControlServer {
    /// Replace any stale socket at `path` and listen on it, owner-only
    pub fn bind(path: &Path, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BernieError::Io(e)),
        }

        let listener = UnixListener::bind(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE))?;
        info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            dispatcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept until `cancel` fires, then remove the socket file. Action tasks
    /// already launched keep running.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Control server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _addr)) => stream,
                        Err(e) => {
                            error!("accept error: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };

                    let id = next_id;
                    next_id += 1;
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(
                        async move {
                            debug!("Client connected");
                            match dispatcher.handle(stream).await {
                                Ok(dispatched) => debug!("{dispatched:?}"),
                                Err(e @ BernieError::DuplicateAction { .. }) => warn!("{e}"),
                                Err(e) => error!("{e}"),
                            }
                        }
                        .instrument(info_span!("conn", id)),
                    );
                }
            }
        }

        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {e}", self.path.display());
        }
        Ok(())
    }
}
