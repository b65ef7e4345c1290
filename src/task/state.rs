/// Lifecycle state of a task.
///
/// A task is created in `Created`, passes through dependency handling,
/// becomes `Queued` when its counters hit zero, transitions to `Running` on
/// a worker and `Finished` after its successors have been released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Running,
    Finished,
    Cancelled,
}

impl TaskState {
    /// An active task may still gain successors; a finished or cancelled one
    /// satisfies any dependency on it immediately.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskState::Created | TaskState::Queued | TaskState::Running
        )
    }
}
