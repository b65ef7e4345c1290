//! Discovery and release of the happens-before relation between tasks.
//!
//! The engine accepts tasks annotated with data dependencies, wires them
//! into predecessor/successor edges against the records of their parent's
//! hash table, resolves cross-unit dependencies in phase order, and releases
//! tasks to the worker pool as soon as their counters reach zero.

use crate::global::{GlobalMemory, Teams, UnitId};
use crate::remote::{RemoteEvents, RemoteTaskRef, Transport};
use crate::runtime::{Schedule, TaskQueue};
use crate::task::{Dep, DepKind, Task, TaskId};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

mod copyin;

mod errors;
pub use errors::DepError;

mod matcher;

pub(crate) mod pool;
pub(crate) use pool::{DepElem, DepPool};

mod release;

mod remote;

pub(crate) mod table;
pub(crate) use table::DepTable;


/// The dependency engine of one unit.
///
/// All runtime-global state lives here: the element free list, the queue of
/// unmatched incoming remote requests, the remote-blocked task list, and the
/// deferred-task queue. One engine is created per unit and threaded through
/// the API as a handle.
pub struct DepEngine {
    my_unit: UnitId,
    teams: Teams,
    pool: DepPool,

    /// Implicit parent of all top-level tasks; owns the table the deferred
    /// remote matching walks.
    root: Arc<Task>,

    /// Tasks resolvable from a wire reference.
    registry: DashMap<TaskId, Arc<Task>>,

    /// Incoming remote requests deferred to the next matching step.
    unhandled_remote: Mutex<Vec<Box<DepElem>>>,

    /// Tasks with no local dependencies left that wait for a remote release.
    remote_blocked: Mutex<Vec<Arc<Task>>>,

    /// Tasks whose phase is not yet runnable.
    deferred: TaskQueue,

    transport: Arc<dyn Transport>,
    memory: Arc<dyn GlobalMemory>,
    scheduler: RwLock<Option<Weak<dyn Schedule>>>,
}

impl DepEngine {
    pub fn new(transport: Arc<dyn Transport>, memory: Arc<dyn GlobalMemory>) -> Arc<DepEngine> {
        Arc::new(DepEngine {
            my_unit: transport.my_unit(),
            teams: Teams::new(),
            pool: DepPool::new(),
            root: Task::new_root(),
            registry: DashMap::new(),
            unhandled_remote: Mutex::new(Vec::new()),
            remote_blocked: Mutex::new(Vec::new()),
            deferred: TaskQueue::new(),
            transport,
            memory,
            scheduler: RwLock::new(None),
        })
    }

    /// Attach the worker-pool seam. Held weakly; the scheduler owns the
    /// engine, not the other way around.
    pub fn bind_scheduler(&self, scheduler: Weak<dyn Schedule>) {
        *self.scheduler.write() = Some(scheduler);
    }

    pub fn my_unit(&self) -> UnitId {
        self.my_unit
    }

    pub fn root(&self) -> &Arc<Task> {
        &self.root
    }

    pub fn register_team(&self, team: crate::global::Team) {
        self.teams.register(team);
    }

    pub(crate) fn memory(&self) -> Arc<dyn GlobalMemory> {
        Arc::clone(&self.memory)
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn scheduler(&self) -> Result<Arc<dyn Schedule>, DepError> {
        self.scheduler
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(DepError::SchedulerDetached)
    }

    pub(crate) fn lookup(&self, r: RemoteTaskRef) -> Option<Arc<Task>> {
        self.registry
            .get(&r.task_id()?)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn unregister(&self, id: TaskId) {
        self.registry.remove(&id);
    }

    /// Hand the task to the scheduler once both counters are zero. The
    /// scheduler decides between the ready queue and the deferred queue
    /// based on the task's phase.
    pub(crate) fn enqueue_runnable(&self, task: &Arc<Task>) {
        match self.scheduler() {
            Ok(scheduler) => scheduler.enqueue_runnable(Arc::clone(task)),
            Err(_) => warn!(task = %task.id(), "no scheduler to enqueue runnable task"),
        }
    }

    /// Park a zero-dependency task whose phase is not yet runnable.
    pub(crate) fn defer_task(&self, task: Arc<Task>) {
        debug!(task = %task.id(), phase = %task.phase(), "deferring task to a later phase");
        self.deferred.push(task);
    }

    /// Find all tasks `task` depends on, record the dependencies, and send
    /// requests for the remote ones.
    ///
    /// Routine failures are reported after all dependencies of the task have
    /// been handled; one bad dependency does not stop the rest.
    pub fn handle_task(&self, task: &Arc<Task>, deps: &[Dep]) -> Result<(), DepError> {
        debug!(
            task = %task.id(),
            ndeps = deps.len(),
            phase = %task.phase(),
            "handling task dependencies"
        );
        self.registry.insert(task.id(), Arc::clone(task));

        let mut first_err = None;
        for dep in deps {
            if let Err(e) = self.handle_dep(task, dep) {
                warn!(task = %task.id(), error = %e, "dependency not handled");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle_dep(&self, task: &Arc<Task>, dep: &Dep) -> Result<(), DepError> {
        match dep {
            Dep::Direct(pred) => {
                self.handle_local_direct(pred, task);
                Ok(())
            }

            Dep::Copyin { copyin, phase } => {
                self.handle_copyin(copyin, phase.or_task(task.phase()), task)
            }

            Dep::Data(data) => {
                if data.kind == DepKind::Ignore {
                    return Ok(());
                }

                let mut data = *data;
                data.phase = data.phase.or_task(task.phase());

                // The unit field is team-local unless the team is ALL.
                let unit = self
                    .teams
                    .global_unit(data.gptr.team, data.gptr.unit)
                    .ok_or(DepError::UnknownTeam(data.gptr.team))?;

                if unit != self.my_unit {
                    self.handle_remote_datadep(&data, unit, task)
                } else {
                    data.gptr = self.memory.localize(data.gptr);
                    if data.kind == DepKind::DelayedIn {
                        self.match_delayed_local_datadep(&data, task);
                    } else {
                        self.match_local_datadep(&data, task);
                        self.add_local_record(&data, task);
                    }
                    Ok(())
                }
            }
        }
    }

    /// An explicit happens-after on a named task.
    fn handle_local_direct(&self, pred: &Arc<Task>, task: &Arc<Task>) {
        let mut inner = pred.inner.lock();
        if inner.state.is_active() {
            let unresolved = task.add_local_dep();
            debug!(
                task = %task.id(),
                pred = %pred.id(),
                unresolved,
                "direct local dependency"
            );
            inner.successors.push(Arc::clone(task));
        }
    }

    /// Promote deferred tasks whose phase has become runnable.
    ///
    /// Tasks in this queue had no unresolved local dependencies when they
    /// were parked; only the remote counter can have grown since (deferred
    /// remote matching may have nominated them as direct-dep candidates).
    /// Such tasks are dropped here, the remote release re-enqueues them.
    pub fn handle_deferred_local(&self, scheduler: &dyn Schedule) {
        let mut deferred = self.deferred.lock();
        debug!(count = deferred.len(), "promoting deferred tasks");
        while let Some(task) = deferred.pop_front() {
            if task.unresolved_remote() == 0 {
                scheduler.make_ready(task);
            } else {
                debug!(
                    task = %task.id(),
                    "deferred task regained remote dependencies, dropping"
                );
            }
        }
    }

    /// Non-blocking poll of the transport for incoming messages.
    pub fn progress(&self) -> Result<(), DepError> {
        self.transport.progress(self).map_err(DepError::from)
    }

    /// Collective barrier over all units.
    pub fn barrier(&self) {
        self.transport.barrier();
    }

    /// Drop all dependency records and counters beneath a parent task.
    /// Resetting twice is the same as resetting once.
    pub fn reset(&self, task: &Arc<Task>) {
        if let Some(mut table) = task.local_deps.lock().take() {
            table.drain_into(&self.pool);
        }

        let remote_successors = std::mem::take(&mut task.inner.lock().remote_successors);
        for elem in remote_successors {
            self.pool.recycle(elem);
        }

        task.reset_dep_counters();
    }

    /// Tear the engine down: recycle everything beneath the root and drop
    /// the free list.
    pub fn fini(&self) {
        self.reset(&self.root);
        for elem in self.unhandled_remote.lock().drain(..) {
            self.pool.recycle(elem);
        }
        self.remote_blocked.lock().clear();
        self.deferred.lock().clear();
        self.registry.clear();
        self.pool.clear();
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &DepPool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn remote_blocked_len(&self) -> usize {
        self.remote_blocked.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn unhandled_remote_len(&self) -> usize {
        self.unhandled_remote.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }
}

/// Incoming messages, forwarded by the transport's `progress`. Failures are
/// logged and do not stop the poll: a malformed request from one peer must
/// not stall local progress.
impl RemoteEvents for DepEngine {
    fn on_dep_request(&self, dep: &crate::task::TaskDep, task: RemoteTaskRef, origin: UnitId) {
        if let Err(e) = self.handle_remote_task(dep, task, origin) {
            warn!(error = %e, %origin, "dropping bad remote dependency request");
        }
    }

    fn on_direct(&self, task: RemoteTaskRef, waiter: RemoteTaskRef, origin: UnitId) {
        if let Err(e) = self.handle_remote_direct(task, waiter, origin) {
            warn!(error = %e, %origin, "failed to handle remote direct dependency");
        }
    }

    fn on_release(&self, task: RemoteTaskRef) {
        if let Err(e) = self.release_remote_dep(task) {
            warn!(error = %e, "failed to handle remote release");
        }
    }
}
