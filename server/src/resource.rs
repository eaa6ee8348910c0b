//! Simulated process entries

use chaosbernie_protocol::ProcessLine;

use crate::config::ActionMode;
use crate::inventory::{InventoryRecord, ResourceKind};
use crate::lifecycle::ResourceStatus;

/// First pid handed out at load time
pub const PID_OFFSET: u32 = 100;

/// A cloud resource dressed up as a process. Only `status` changes after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Owning resource group, shown as the process user
    pub owner: String,
    pub pid: u32,
    pub name: String,
    pub daemon: bool,
    pub kind: ResourceKind,
    pub status: ResourceStatus,
}

impl Resource {
    pub fn from_record(record: &InventoryRecord, pid: u32, mode: ActionMode) -> Self {
        Self {
            owner: record.resource_group.clone(),
            pid,
            name: record.name.clone(),
            daemon: mode.marks_daemon(),
            kind: ResourceKind::from_type(&record.resource_type),
            status: ResourceStatus::Alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == ResourceStatus::Alive
    }

    pub fn process_line(&self) -> ProcessLine {
        ProcessLine {
            owner: self.owner.clone(),
            pid: self.pid,
            name: self.name.clone(),
            daemon: self.daemon,
        }
    }
}
