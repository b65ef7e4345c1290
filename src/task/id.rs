use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a task, also used as the wire-visible reference when
/// a remote unit needs to name one of our tasks.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

/// The root task of the runtime, implicit parent of all top-level tasks.
pub(crate) const ROOT_ID: TaskId = TaskId(NonZeroU64::MAX);

impl TaskId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        // Safety: this number is unimaginably large, even a runtime creating
        // 1 billion tasks/sec would take 584 years to wrap around.
        loop {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = NonZeroU64::new(id) {
                return Self(id);
            }
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    pub(crate) fn from_wire(raw: u64) -> Option<TaskId> {
        NonZeroU64::new(raw).map(TaskId)
    }

    pub fn is_root(&self) -> bool {
        *self == ROOT_ID
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "t:root")
        } else {
            write!(f, "t:{}", self.0)
        }
    }
}
