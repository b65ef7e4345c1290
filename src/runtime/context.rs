use crate::task::Task;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

/// The task currently executing on this thread, if any. Nested submissions
/// use it to pick up the correct parent.
pub fn current_task() -> Option<Arc<Task>> {
    CURRENT_TASK.with(|t| t.borrow().clone())
}

pub(crate) fn set_current_task(task: Option<Arc<Task>>) -> Option<Arc<Task>> {
    CURRENT_TASK.with(|t| t.replace(task))
}

/// Sets and clears the current task around the execution of its action.
pub(crate) struct TaskGuard {
    prev: Option<Arc<Task>>,
}

impl TaskGuard {
    pub(crate) fn enter(task: Arc<Task>) -> TaskGuard {
        TaskGuard {
            prev: set_current_task(Some(task)),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        set_current_task(self.prev.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::Phase;

    #[test]
    fn test_guard_restores_previous_task() {
        assert!(current_task().is_none());

        let outer = Task::new(Phase::FIRST, None, None);
        let inner = Task::new(Phase::FIRST, None, None);

        let _outer_guard = TaskGuard::enter(outer.clone());
        assert!(Arc::ptr_eq(&current_task().unwrap(), &outer));

        {
            let _inner_guard = TaskGuard::enter(inner.clone());
            assert!(Arc::ptr_eq(&current_task().unwrap(), &inner));
        }

        assert!(Arc::ptr_eq(&current_task().unwrap(), &outer));
        drop(_outer_guard);
        assert!(current_task().is_none());
    }
}
