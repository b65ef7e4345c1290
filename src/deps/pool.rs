use crate::global::UnitId;
use crate::remote::RemoteTaskRef;
use crate::task::{Task, TaskDep};
use parking_lot::Mutex;
use std::sync::Arc;

/// Task named by a dependency element. Records hold a non-owning view in
/// spirit: the element is owned by whichever list currently contains it, and
/// the `None` state marks a recycled element sitting in the free list.
pub(crate) enum TaskRef {
    None,
    Local(Arc<Task>),
    Remote(RemoteTaskRef),
}

impl TaskRef {
    pub(crate) fn is_none(&self) -> bool {
        matches!(self, TaskRef::None)
    }

    pub(crate) fn local(&self) -> Option<&Arc<Task>> {
        match self {
            TaskRef::Local(task) => Some(task),
            _ => None,
        }
    }

    pub(crate) fn remote(&self) -> Option<RemoteTaskRef> {
        match self {
            TaskRef::Remote(r) => Some(*r),
            _ => None,
        }
    }
}

/// One dependency record. Elements move between a parent's hash buckets, the
/// unhandled-remote queue, a task's remote-successor list, and the free
/// list; they are in exactly one of those at any time.
pub(crate) struct DepElem {
    pub(crate) dep: TaskDep,
    pub(crate) task: TaskRef,
    /// The unit this dependency originated from.
    pub(crate) origin: UnitId,
}

impl DepElem {
    fn vacant() -> DepElem {
        DepElem {
            dep: TaskDep::cleared(),
            task: TaskRef::None,
            origin: UnitId(0),
        }
    }

    /// The task behind a record in a local dependency table. Local tables
    /// never hold remote references; anything else is a corrupted list.
    pub(crate) fn local_task(&self) -> &Arc<Task> {
        self.task
            .local()
            .expect("local dependency table holds a non-local task reference")
    }
}

/// Free list of dependency records.
///
/// Not fair and not lock-free, but it never hands out the same element twice
/// and a recycled element must come back cleared: handing out a dirty one
/// means some list recycled an element it did not own.
pub(crate) struct DepPool {
    free: Mutex<Vec<Box<DepElem>>>,
}

impl DepPool {
    pub(crate) fn new() -> DepPool {
        DepPool {
            free: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn allocate(&self, dep: TaskDep, task: TaskRef, origin: UnitId) -> Box<DepElem> {
        assert!(!task.is_none(), "allocating a dependency element without a task");

        let mut elem = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(DepElem::vacant()));

        assert!(
            elem.task.is_none(),
            "recycled dependency element was not cleared before reuse"
        );

        elem.dep = dep;
        elem.task = task;
        elem.origin = origin;
        elem
    }

    pub(crate) fn recycle(&self, mut elem: Box<DepElem>) {
        elem.dep = TaskDep::cleared();
        elem.task = TaskRef::None;
        elem.origin = UnitId(0);
        self.free.lock().push(elem);
    }

    pub(crate) fn clear(&self) {
        self.free.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::{GlobalPtr, Phase, SegmentId};
    use crate::task::DepKind;

    fn some_dep() -> TaskDep {
        TaskDep::new(
            DepKind::Out,
            GlobalPtr::new(UnitId(0), SegmentId(1), 0x40),
            Phase(2),
        )
    }

    #[test]
    fn test_allocate_recycle_reuses_elements() {
        let pool = DepPool::new();
        let task = Task::new(Phase::FIRST, None, None);

        let elem = pool.allocate(some_dep(), TaskRef::Local(task.clone()), UnitId(3));
        assert_eq!(elem.origin, UnitId(3));
        assert_eq!(pool.free_len(), 0);

        let first = std::ptr::from_ref::<DepElem>(&*elem) as usize;
        pool.recycle(elem);
        assert_eq!(pool.free_len(), 1);

        let again = pool.allocate(some_dep(), TaskRef::Local(task), UnitId(1));
        assert_eq!(std::ptr::from_ref::<DepElem>(&*again) as usize, first);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_recycle_clears_the_task_ref() {
        let pool = DepPool::new();
        let task = Task::new(Phase::FIRST, None, None);
        let refs_before = Arc::strong_count(&task);

        let elem = pool.allocate(some_dep(), TaskRef::Local(task.clone()), UnitId(0));
        assert_eq!(Arc::strong_count(&task), refs_before + 1);

        pool.recycle(elem);
        assert_eq!(Arc::strong_count(&task), refs_before);
    }
}
