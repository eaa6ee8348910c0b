//! Resource Registry — the simulated process table
//!
//! The set of resources is fixed at load time. The only mutation is a status
//! transition, and every transition goes through [`Registry::set_status`],
//! which validates it, commits it and notifies the observer under one
//! exclusive lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ActionMode;
use crate::error::{BernieError, Result};
use crate::inventory::{self, InventoryRecord};
use crate::lifecycle::ResourceStatus;
use crate::observer::StatusObserver;
use crate::resource::{Resource, PID_OFFSET};

pub struct Registry {
    resources: RwLock<Vec<Resource>>,
    /// pid → position in `resources`; never changes after load
    index: HashMap<u32, usize>,
    observer: Arc<dyn StatusObserver>,
}

impl Registry {
    /// Build the table from inventory records, in inventory order, with pids
    /// starting at [`PID_OFFSET`]
    pub fn load(
        records: &[InventoryRecord],
        mode: ActionMode,
        observer: Arc<dyn StatusObserver>,
    ) -> Self {
        let resources: Vec<Resource> = records
            .iter()
            .zip(PID_OFFSET..)
            .map(|(record, pid)| Resource::from_record(record, pid, mode))
            .collect();

        let index = resources
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.pid, pos))
            .collect();

        info!("Loaded {} resources", resources.len());
        observer.on_status_change(&resources);

        Self {
            resources: RwLock::new(resources),
            index,
            observer,
        }
    }

    /// Read, parse and load an inventory file
    pub fn from_inventory_file(
        path: &Path,
        mode: ActionMode,
        observer: Arc<dyn StatusObserver>,
    ) -> Result<Self> {
        let records = inventory::load_inventory(path)?;
        Ok(Self::load(&records, mode, observer))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Copy of the resource with `pid`
    pub async fn find(&self, pid: u32) -> Result<Resource> {
        let pos = *self.index.get(&pid).ok_or(BernieError::NotFound(pid))?;
        let resources = self.resources.read().await;
        Ok(resources[pos].clone())
    }

    /// Consistent copy of the whole table in load order
    pub async fn snapshot(&self) -> Vec<Resource> {
        self.resources.read().await.clone()
    }

    /// Resources still `Alive`, in load order
    pub async fn alive(&self) -> Vec<Resource> {
        self.resources
            .read()
            .await
            .iter()
            .filter(|r| r.is_alive())
            .cloned()
            .collect()
    }

    /// Move `pid` to `to` if that is its next lifecycle step.
    ///
    /// Asking for `Shot` on a resource that has already left `Alive` yields
    /// [`BernieError::DuplicateAction`]; any other illegal step yields
    /// [`BernieError::InvalidTransition`]. Returns the updated resource.
    pub async fn set_status(&self, pid: u32, to: ResourceStatus) -> Result<Resource> {
        let pos = *self.index.get(&pid).ok_or(BernieError::NotFound(pid))?;
        let mut resources = self.resources.write().await;
        let resource = &mut resources[pos];
        let from = resource.status;

        if !from.can_transition_to(to) {
            return Err(if to == ResourceStatus::Shot {
                BernieError::DuplicateAction { pid, status: from }
            } else {
                BernieError::InvalidTransition { pid, from, to }
            });
        }

        resource.status = to;
        let updated = resource.clone();
        debug!(
            "{} {} {} {} [{}]",
            updated.owner.to_lowercase(),
            updated.pid,
            updated.name,
            u8::from(updated.daemon),
            updated.status
        );

        self.observer.on_status_change(&resources);
        Ok(updated)
    }
}
