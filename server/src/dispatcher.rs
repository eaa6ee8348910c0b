//! Connection Dispatcher
//!
//! One request per connection. `ps` is answered inline; destructive actions
//! are handed to the executor on their own task and the connection is closed
//! without a reply. Every failure is confined to its connection and produces
//! no reply.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chaosbernie_protocol::{Action, ProtocolError, Request, MAX_REQUEST_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{BernieError, Result};
use crate::executor::ActionExecutor;
use crate::registry::Registry;

/// What a handled connection led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// `ps` answered with this many lines
    Listed(usize),
    /// Executor launched for this pid
    Launched(u32),
    /// Well-formed request for an action nobody handles
    Ignored(String),
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    executor: Arc<ActionExecutor>,
    extra_actions: HashSet<String>,
    read_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<ActionExecutor>,
        extra_actions: impl IntoIterator<Item = String>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::clone(executor.registry()),
            executor,
            extra_actions: extra_actions.into_iter().collect(),
            read_timeout,
        }
    }

    fn is_destructive(&self, action: &Action) -> bool {
        match action {
            Action::Other(name) => self.extra_actions.contains(name),
            other => other.is_builtin_destructive(),
        }
    }

    /// Read one request with the deadline, then parse it
    pub async fn read_request<S>(&self, stream: &mut S) -> Result<Request>
    where
        S: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; MAX_REQUEST_LEN];
        let nread = tokio::time::timeout(self.read_timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| {
                BernieError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no request within {:?}", self.read_timeout),
                ))
            })??;
        buffer.truncate(nread);
        let text = String::from_utf8_lossy(&buffer);
        debug!("bytes read: {nread}, content: {text:?}");
        Ok(Request::parse(&text)?)
    }

    /// Serve one accepted connection
    pub async fn handle<S>(&self, mut stream: S) -> Result<Dispatched>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.read_request(&mut stream).await?;

        let dispatched = match &request.action {
            Action::Ps => {
                info!("PS");
                let count = self.write_process_list(&mut stream).await?;
                Dispatched::Listed(count)
            }
            action if self.is_destructive(action) => {
                info!("{}: {:?}", action.as_str().to_uppercase(), request.value);
                let pid = request.pid().map_err(|e| match e {
                    ProtocolError::MissingPid(_) | ProtocolError::InvalidPid(_) => {
                        BernieError::InvalidArgument(e.to_string())
                    }
                    other => BernieError::Protocol(other),
                })?;
                self.registry.find(pid).await?;
                self.executor.spawn(pid);
                Dispatched::Launched(pid)
            }
            other => {
                warn!("action not found: {other}");
                Dispatched::Ignored(other.to_string())
            }
        };

        // Client may already be gone; nothing is waiting on the result.
        let _ = stream.shutdown().await;
        Ok(dispatched)
    }

    /// Write `<owner> <pid> <name> <daemon>` for every live resource
    async fn write_process_list<S>(&self, stream: &mut S) -> Result<usize>
    where
        S: AsyncWrite + Unpin,
    {
        let alive = self.registry.alive().await;
        let mut reply = String::new();
        for resource in &alive {
            reply.push_str(&resource.process_line().encode());
        }
        stream.write_all(reply.as_bytes()).await?;
        stream.flush().await?;
        Ok(alive.len())
    }
}
