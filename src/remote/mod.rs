//! The transport seam: how the dependency engine talks to its peers.
//!
//! The engine never sees wire formats; it sends through the [`Transport`]
//! trait and receives through the [`RemoteEvents`] callbacks it implements
//! itself. [`loopback`] provides an in-process transport for single-process
//! multi-unit runs and tests.

use crate::global::UnitId;
use crate::task::{TaskDep, TaskId};
use anyhow::Result;
use std::fmt;

mod message;
pub use message::DepMessage;

pub mod loopback;
pub use loopback::{LoopbackHub, LoopbackTransport};

/// Opaque reference to a task living on another unit; minted from the task's
/// ID by its owning unit and echoed back verbatim.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct RemoteTaskRef(u64);

impl RemoteTaskRef {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Resolve back to a task ID on the owning unit.
    pub(crate) fn task_id(&self) -> Option<TaskId> {
        TaskId::from_wire(self.0)
    }
}

impl From<TaskId> for RemoteTaskRef {
    fn from(id: TaskId) -> RemoteTaskRef {
        RemoteTaskRef(id.as_u64())
    }
}

impl fmt::Debug for RemoteTaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt:{}", self.0)
    }
}

/// Point-to-point and collective primitives the engine needs from the
/// messaging layer.
pub trait Transport: Send + Sync + 'static {
    /// This unit's process-global identity.
    fn my_unit(&self) -> UnitId;

    fn num_units(&self) -> usize;

    /// Collective barrier over all units; bounds each phase.
    fn barrier(&self);

    /// Ask `target` to order `task` behind its local writers of `dep`.
    fn send_dep_request(&self, target: UnitId, task: RemoteTaskRef, dep: &TaskDep) -> Result<()>;

    /// Tell `target` that the data behind `dep` is ready for `task`.
    fn send_release(&self, target: UnitId, task: RemoteTaskRef, dep: &TaskDep) -> Result<()>;

    /// Tell `target` that our task `waiter` must be released when its local
    /// task `task` finishes.
    fn send_direct(&self, target: UnitId, task: RemoteTaskRef, waiter: RemoteTaskRef)
    -> Result<()>;

    /// Non-blocking poll for incoming messages, dispatched to `events`.
    fn progress(&self, events: &dyn RemoteEvents) -> Result<()>;
}

/// Callbacks the engine exposes to the transport for incoming messages.
pub trait RemoteEvents {
    fn on_dep_request(&self, dep: &TaskDep, task: RemoteTaskRef, origin: UnitId);

    fn on_direct(&self, task: RemoteTaskRef, waiter: RemoteTaskRef, origin: UnitId);

    fn on_release(&self, task: RemoteTaskRef);
}
