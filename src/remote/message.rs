use crate::global::UnitId;
use crate::remote::RemoteTaskRef;
use crate::task::TaskDep;

/// Messages exchanged between units. The byte layout on a real wire is the
/// transport's business; in-process transports move these values directly.
#[derive(Clone, Copy, Debug)]
pub enum DepMessage {
    /// `task` at `origin` depends on data of ours described by `dep`.
    Request {
        dep: TaskDep,
        task: RemoteTaskRef,
        origin: UnitId,
    },
    /// The dependency `dep` of our `task` is satisfied at `origin`.
    Release { task: RemoteTaskRef, dep: TaskDep },
    /// Our local `task` must notify `waiter` at `origin` when it finishes.
    Direct {
        task: RemoteTaskRef,
        waiter: RemoteTaskRef,
        origin: UnitId,
    },
}
