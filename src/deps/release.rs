use crate::deps::DepEngine;
use crate::deps::pool::DepElem;
use crate::task::{Task, TaskState};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl DepEngine {
    /// Release the local and remote dependencies of a finished (or
    /// cancelled) task.
    ///
    /// Cancelled tasks skip the remote releases so remote waiters are not
    /// woken with stale data; their local successors are still released.
    pub fn release_local_task(&self, task: &Arc<Task>) {
        let (cancelled, successors, remote_successors) = {
            let mut inner = task.inner.lock();
            (
                inner.state == TaskState::Cancelled,
                std::mem::take(&mut inner.successors),
                std::mem::take(&mut inner.remote_successors),
            )
        };

        if cancelled {
            for elem in remote_successors {
                self.pool.recycle(elem);
            }
        } else {
            self.release_remote_successors(task, remote_successors);
        }

        trace!(task = %task.id(), count = successors.len(), "releasing local successors");
        for succ in successors {
            let runnable = succ.release_local_dep();
            debug!(
                task = %succ.id(),
                local = succ.unresolved_local(),
                remote = succ.unresolved_remote(),
                "released local dependency"
            );
            if runnable {
                self.enqueue_runnable(&succ);
            }
        }

        self.unregister(task.id());
    }

    /// Send a release to every remote recipient recorded on the task.
    fn release_remote_successors(&self, task: &Arc<Task>, remote_successors: Vec<Box<DepElem>>) {
        trace!(
            task = %task.id(),
            count = remote_successors.len(),
            "releasing remote successors"
        );
        for elem in remote_successors {
            let remote_task = elem
                .task
                .remote()
                .expect("remote-successor list holds a non-remote task reference");
            if let Err(e) = self
                .transport()
                .send_release(elem.origin, remote_task, &elem.dep)
            {
                warn!(error = %e, origin = %elem.origin, "failed to send remote release");
            }
            self.pool.recycle(elem);
        }
    }

    /// Drain the remote-blocked list, forget all remote dependencies, and
    /// enqueue every task that has no local ones either. Called on shutdown
    /// or user-initiated abort.
    pub fn cancel_remote_deps(&self) {
        let drained: Vec<Arc<Task>> = self.remote_blocked.lock().drain(..).collect();
        debug!(count = drained.len(), "cancelling remote dependencies");

        for task in drained {
            task.clear_remote_deps();
            // Late releases for these tasks now resolve to an unknown
            // reference instead of underflowing a zeroed counter.
            self.unregister(task.id());
            if task.unresolved_local() == 0 {
                self.enqueue_runnable(&task);
            }
        }
    }
}
