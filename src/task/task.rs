use crate::deps::{DepElem, DepTable};
use crate::global::Phase;
use crate::runtime::SPILL_TO_HEAP_THRESHOLD;
use crate::task::{TaskId, TaskState, id::ROOT_ID};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

/// Work executed by the worker pool once the task's dependencies are
/// satisfied.
pub type TaskAction = Box<dyn FnOnce() + Send + 'static>;

/// State and edge lists guarded by the task mutex.
///
/// A task only observes its successor lists under this lock; the state read
/// that decides whether a predecessor may still gain successors happens
/// under the same lock to rule out enqueue-after-finish races.
pub(crate) struct TaskInner {
    pub(crate) state: TaskState,
    /// Local tasks to release when this task finishes.
    pub(crate) successors: SmallVec<[Arc<Task>; SPILL_TO_HEAP_THRESHOLD]>,
    /// Dependency records naming remote tasks to notify when this task
    /// finishes.
    pub(crate) remote_successors: Vec<Box<DepElem>>,
    pub(crate) action: Option<TaskAction>,
}

/// One node of the task graph.
///
/// The parent reference is weak: a parent owns the dependency table its
/// children's records live in, while ownership of the records themselves is
/// determined by the list that currently contains them.
pub struct Task {
    id: TaskId,
    phase: Phase,
    parent: Option<Weak<Task>>,

    /// Local predecessors not yet released.
    unresolved_local: AtomicI32,
    /// Remote predecessors not yet released.
    unresolved_remote: AtomicI32,

    pub(crate) inner: Mutex<TaskInner>,

    /// Per-parent hash table of registered dependency records, lazily
    /// allocated on the first child with dependencies. Only non-empty on
    /// parents that own children.
    pub(crate) local_deps: Mutex<Option<Box<DepTable>>>,
}

impl Task {
    pub(crate) fn new(
        phase: Phase,
        parent: Option<&Arc<Task>>,
        action: Option<TaskAction>,
    ) -> Arc<Task> {
        Arc::new(Task {
            id: TaskId::next(),
            phase,
            parent: parent.map(Arc::downgrade),
            unresolved_local: AtomicI32::new(0),
            unresolved_remote: AtomicI32::new(0),
            inner: Mutex::new(TaskInner {
                state: TaskState::Created,
                successors: SmallVec::new(),
                remote_successors: Vec::new(),
                action,
            }),
            local_deps: Mutex::new(None),
        })
    }

    pub(crate) fn new_root() -> Arc<Task> {
        Arc::new(Task {
            id: ROOT_ID,
            phase: Phase::FIRST,
            parent: None,
            unresolved_local: AtomicI32::new(0),
            unresolved_remote: AtomicI32::new(0),
            inner: Mutex::new(TaskInner {
                state: TaskState::Running,
                successors: SmallVec::new(),
                remote_successors: Vec::new(),
                action: None,
            }),
            local_deps: Mutex::new(None),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Task>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub fn unresolved_local(&self) -> i32 {
        self.unresolved_local.load(Ordering::Acquire)
    }

    pub fn unresolved_remote(&self) -> i32 {
        self.unresolved_remote.load(Ordering::Acquire)
    }

    pub fn is_runnable(&self) -> bool {
        self.unresolved_local() == 0 && self.unresolved_remote() == 0
    }

    pub fn successor_count(&self) -> usize {
        self.inner.lock().successors.len()
    }

    /// Request cancellation. Only tasks that have not started can be
    /// cancelled; the worker pool skips their action but still routes them
    /// through the release engine so local successors are unblocked.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            TaskState::Created | TaskState::Queued => {
                inner.state = TaskState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// The `Created -> Queued` transition guards the hand-off to the ready
    /// queue: whoever wins it holds the exclusive right to enqueue.
    pub(crate) fn transition_to_queued(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Created {
            inner.state = TaskState::Queued;
            true
        } else {
            false
        }
    }

    pub(crate) fn take_action(&self) -> Option<TaskAction> {
        self.inner.lock().action.take()
    }

    /// Register one more unresolved local predecessor. Returns the new count.
    pub(crate) fn add_local_dep(&self) -> i32 {
        self.unresolved_local.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Register one more unresolved remote predecessor. Returns the new count.
    pub(crate) fn add_remote_dep(&self) -> i32 {
        self.unresolved_remote.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Release one local predecessor. Returns whether both counters reached
    /// zero. A decrement past zero is a runtime bug and aborts.
    pub(crate) fn release_local_dep(&self) -> bool {
        let local = self.unresolved_local.fetch_sub(1, Ordering::AcqRel) - 1;
        let remote = self.unresolved_remote.load(Ordering::Acquire);
        assert!(
            local >= 0 && remote >= 0,
            "dependency counter underflow on task {} [{local},{remote}]",
            self.id,
        );
        local == 0 && remote == 0
    }

    /// Release one remote predecessor. Returns `(runnable, remote_zero)`:
    /// whether both counters reached zero, and whether the remote counter
    /// alone did (the caller then splices the task out of the
    /// remote-blocked list).
    pub(crate) fn release_remote_dep(&self) -> (bool, bool) {
        let remote = self.unresolved_remote.fetch_sub(1, Ordering::AcqRel) - 1;
        let local = self.unresolved_local.load(Ordering::Acquire);
        assert!(
            local >= 0 && remote >= 0,
            "dependency counter underflow on task {} [{local},{remote}]",
            self.id,
        );
        (local == 0 && remote == 0, remote == 0)
    }

    /// Forget all remote predecessors (cancellation path).
    pub(crate) fn clear_remote_deps(&self) {
        self.unresolved_remote.store(0, Ordering::Release);
    }

    pub(crate) fn reset_dep_counters(&self) {
        self.unresolved_local.store(0, Ordering::Release);
        self.unresolved_remote.store(0, Ordering::Release);
    }
}

// Skip the edge lists to avoid locking (and printing half the graph).
impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("unresolved_local", &self.unresolved_local)
            .field("unresolved_remote", &self.unresolved_remote)
            .finish()
    }
}
