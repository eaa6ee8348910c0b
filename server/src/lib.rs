//! chaosbernie daemon library
//!
//! Models cloud resources as entries in a fake process table and serves that
//! table over a Unix socket, so process tools can list and "kill" them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod graph;
pub mod inventory;
pub mod lifecycle;
pub mod observer;
pub mod registry;
pub mod resource;
pub mod server;

pub use config::{ActionMode, BernieConfig};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{BernieError, Result};
pub use executor::{ActionExecutor, ActionOutcome, ActionRunner, ShellRunner};
pub use lifecycle::ResourceStatus;
pub use observer::{NoopObserver, StatusObserver};
pub use registry::Registry;
pub use resource::Resource;
pub use server::ControlServer;
