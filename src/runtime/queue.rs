use crate::task::Task;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;

/// A mutex-guarded FIFO of tasks; used for the deferred-task queue.
///
/// Batched drains lock the queue once and hand tasks over while holding the
/// guard, so a task cannot be observed in two queues at the same time.
pub struct TaskQueue {
    queue: Mutex<VecDeque<Arc<Task>>>,
}

impl TaskQueue {
    pub fn new() -> TaskQueue {
        TaskQueue {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, task: Arc<Task>) {
        self.queue.lock().push_back(task);
    }

    pub fn pop(&self) -> Option<Arc<Task>> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Task>>> {
        self.queue.lock()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new()
    }
}
