use crate::global::{GlobalPtr, Phase};
use crate::task::Task;
use std::sync::Arc;

/// Closed set of dependency kinds handled by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepKind {
    /// Reads the location.
    In,
    /// Writes the location.
    Out,
    /// Reads and writes the location.
    Inout,
    /// Input submitted out of phase order, matched with phase awareness.
    DelayedIn,
    /// Explicit happens-after between two named tasks, no memory address.
    Direct,
    /// Prefetch a remote location into a local buffer before the task runs.
    Copyin,
    /// Skipped entirely.
    Ignore,
}

impl DepKind {
    /// Output dependencies dominate matching: a bucket scan stops at the
    /// first writer.
    pub fn is_output(self) -> bool {
        matches!(self, DepKind::Out | DepKind::Inout)
    }
}

/// A data dependency on a global address in a phase.
#[derive(Clone, Copy, Debug)]
pub struct TaskDep {
    pub kind: DepKind,
    pub gptr: GlobalPtr,
    pub phase: Phase,
}

impl TaskDep {
    pub fn new(kind: DepKind, gptr: GlobalPtr, phase: Phase) -> TaskDep {
        TaskDep { kind, gptr, phase }
    }

    /// The zeroed form a recycled dependency element carries.
    pub(crate) fn cleared() -> TaskDep {
        TaskDep {
            kind: DepKind::Ignore,
            gptr: GlobalPtr::NULL,
            phase: Phase::FIRST,
        }
    }
}

/// Source and destination of a copy-in prefetch.
#[derive(Clone, Copy, Debug)]
pub struct CopyinDep {
    pub src: GlobalPtr,
    pub dest: u64,
    pub len: usize,
}

/// A dependency as submitted with a task.
#[derive(Clone)]
pub enum Dep {
    /// In/Out/Inout/DelayedIn on a global address.
    Data(TaskDep),
    /// Happens-after the named task.
    Direct(Arc<Task>),
    /// Have the runtime prefetch `src` into the local buffer at `dest`
    /// before the task runs.
    Copyin { copyin: CopyinDep, phase: Phase },
}

impl Dep {
    pub fn input(gptr: GlobalPtr) -> Dep {
        Dep::Data(TaskDep::new(DepKind::In, gptr, Phase::TASK))
    }

    pub fn output(gptr: GlobalPtr) -> Dep {
        Dep::Data(TaskDep::new(DepKind::Out, gptr, Phase::TASK))
    }

    pub fn inout(gptr: GlobalPtr) -> Dep {
        Dep::Data(TaskDep::new(DepKind::Inout, gptr, Phase::TASK))
    }

    /// An input inserted "into the past": `phase` may be earlier than
    /// dependencies already submitted.
    pub fn delayed_input(gptr: GlobalPtr, phase: Phase) -> Dep {
        Dep::Data(TaskDep::new(DepKind::DelayedIn, gptr, phase))
    }

    pub fn direct(task: &Arc<Task>) -> Dep {
        Dep::Direct(Arc::clone(task))
    }

    pub fn copyin(src: GlobalPtr, dest: u64, len: usize) -> Dep {
        Dep::Copyin {
            copyin: CopyinDep { src, dest, len },
            phase: Phase::TASK,
        }
    }
}
