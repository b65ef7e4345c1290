//! Task objects, lifecycle states, and the dependency types submitted with
//! them.

mod dep;
pub use dep::{CopyinDep, Dep, DepKind, TaskDep};

pub(crate) mod id;
pub use id::TaskId;

mod state;
pub use state::TaskState;

#[allow(clippy::module_inception)]
mod task;
pub use task::{Task, TaskAction};
