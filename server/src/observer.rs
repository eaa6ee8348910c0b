//! Status change notifications
//!
//! The registry calls its observer while still holding the write lock, right
//! after a transition is committed, so observers always see the latest state
//! and see transitions in commit order. Observers must be quick and must not
//! call back into the registry.
//!
//! Notifications run synchronously on a runtime worker and every `ps` or
//! `find` waits behind them. An observer doing blocking I/O should hand it to
//! `tokio::task::block_in_place` when on a multi-thread runtime, as
//! [`GraphWriter`](crate::graph::GraphWriter) does.

use crate::resource::Resource;

pub trait StatusObserver: Send + Sync {
    /// Called once after load and after every committed status change, with
    /// the full resource table in load order
    fn on_status_change(&self, resources: &[Resource]);
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status_change(&self, _resources: &[Resource]) {}
}
