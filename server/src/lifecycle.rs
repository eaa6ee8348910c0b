//! Resource status lifecycle: Alive → Shot → Dead
//!
//! `Shot` is the concurrency guard. A destructive action may only start by
//! moving a resource out of `Alive`, and the registry performs that check and
//! the write under one exclusive lock, so at most one action is ever issued
//! per resource.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceStatus {
    Alive,
    Shot,
    Dead,
}

impl ResourceStatus {
    /// The only legal successor of this status, if any
    pub fn next(self) -> Option<ResourceStatus> {
        match self {
            ResourceStatus::Alive => Some(ResourceStatus::Shot),
            ResourceStatus::Shot => Some(ResourceStatus::Dead),
            ResourceStatus::Dead => None,
        }
    }

    pub fn can_transition_to(self, to: ResourceStatus) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(self) -> bool {
        self == ResourceStatus::Dead
    }

    /// Graphviz fill colour used by the status graph
    pub fn colour(self) -> &'static str {
        match self {
            ResourceStatus::Alive => "green3",
            ResourceStatus::Shot => "orange",
            ResourceStatus::Dead => "orangered",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceStatus::Alive => "Alive",
            ResourceStatus::Shot => "Shot",
            ResourceStatus::Dead => "Dead",
        };
        f.write_str(name)
    }
}
