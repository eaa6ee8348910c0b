//! Error taxonomy for the chaosbernie daemon
//!
//! Only `MalformedInventory`, `Config` and startup `Io` errors are fatal.
//! Everything else is scoped to one connection or one command and is logged
//! by whoever receives it.

use chaosbernie_protocol::ProtocolError;
use thiserror::Error;

use crate::lifecycle::ResourceStatus;

pub type Result<T> = std::result::Result<T, BernieError>;

#[derive(Debug, Error)]
pub enum BernieError {
    #[error("malformed inventory: {0}")]
    MalformedInventory(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pid {0} not in process list")]
    NotFound(u32),

    #[error("pid {pid} already acted on (status {status})")]
    DuplicateAction { pid: u32, status: ResourceStatus },

    #[error("pid {pid} cannot move from {from} to {to}")]
    InvalidTransition {
        pid: u32,
        from: ResourceStatus,
        to: ResourceStatus,
    },

    #[error("external action failed: {0}")]
    ExternalActionFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BernieError {
    /// Whether the process has to stop. Per-connection and per-command
    /// errors never are.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BernieError::MalformedInventory(_) | BernieError::Config(_)
        )
    }
}
