//! The embedding side of the engine: configuration, the worker pool running
//! released tasks, and the runtime handle tying both together.

mod builder;
pub use builder::Builder;

pub(crate) mod context;
pub use context::current_task;

mod queue;
pub use queue::TaskQueue;

#[allow(clippy::module_inception)]
mod runtime;
pub use runtime::{Runtime, TaskBuilder};

mod worker;
pub use worker::Schedule;


// Used wherever successor lists store entries on the stack first; most
// fan-outs are small and never spill to the heap.
pub(crate) const SPILL_TO_HEAP_THRESHOLD: usize = 8;
