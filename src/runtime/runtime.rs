use crate::deps::{DepEngine, DepError};
use crate::global::{GlobalMemory, Phase, UnitId};
use crate::remote::Transport;
use crate::runtime::builder::RuntimeConfig;
use crate::runtime::context;
use crate::runtime::worker::{Schedule, WorkerPool};
use crate::task::{Dep, Task, TaskAction};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// One unit's task runtime: the dependency engine plus the worker pool
/// executing released tasks.
pub struct Runtime {
    engine: Arc<DepEngine>,
    pool: Arc<WorkerPool>,

    /// Phase assigned to newly submitted tasks.
    phase: AtomicI32,

    finalized: AtomicBool,
}

impl Runtime {
    pub(crate) fn new(
        cfg: RuntimeConfig,
        transport: Arc<dyn Transport>,
        memory: Arc<dyn GlobalMemory>,
    ) -> Result<Runtime> {
        let engine = DepEngine::new(transport, memory);
        let pool = WorkerPool::new(cfg, Arc::clone(&engine));

        let pool_dyn: Arc<dyn Schedule> = Arc::clone(&pool) as Arc<dyn Schedule>;
        let scheduler: Weak<dyn Schedule> = Arc::downgrade(&pool_dyn);
        engine.bind_scheduler(scheduler);
        pool.spawn_workers()?;

        Ok(Runtime {
            engine,
            pool,
            phase: AtomicI32::new(Phase::FIRST.0),
            finalized: AtomicBool::new(false),
        })
    }

    pub fn engine(&self) -> &Arc<DepEngine> {
        &self.engine
    }

    pub fn my_unit(&self) -> UnitId {
        self.engine.my_unit()
    }

    /// The phase newly submitted tasks inherit.
    pub fn phase(&self) -> Phase {
        Phase(self.phase.load(Ordering::Acquire))
    }

    /// Start the next submission phase.
    pub fn advance_phase(&self) -> Phase {
        let phase = Phase(self.phase.fetch_add(1, Ordering::AcqRel) + 1);
        debug!(%phase, "advanced submission phase");
        phase
    }

    /// The synchronization point bounding a phase: wait for all units, then
    /// resolve the incoming remote requests against the now-complete local
    /// table, open the current phase for execution, and promote deferred
    /// tasks.
    pub fn complete_phase(&self) -> Result<(), DepError> {
        self.engine.progress()?;
        self.engine.barrier();
        // Sends are in flight before the barrier, so every request bounded
        // by it is now in our inbox.
        self.engine.progress()?;
        self.engine.handle_deferred_remote()?;

        let phase = self.phase();
        self.pool.set_runnable_phase(phase);
        self.engine.handle_deferred_local(self.pool.as_ref());
        Ok(())
    }

    /// Begin building a task around `action`.
    pub fn task<F>(&self, action: F) -> TaskBuilder<'_>
    where
        F: FnOnce() + Send + 'static,
    {
        TaskBuilder {
            runtime: self,
            action: Some(Box::new(action)),
            phase: Phase::TASK,
            deps: Vec::new(),
        }
    }

    /// Non-blocking poll of the transport for incoming messages.
    pub fn progress(&self) -> Result<(), DepError> {
        self.engine.progress()
    }

    /// Block until every submitted task has finished.
    pub fn quiesce(&self) {
        self.pool.quiesce();
    }

    /// Abort all remote waits: tasks blocked only on remote releases become
    /// runnable immediately.
    pub fn cancel_remote_deps(&self) {
        self.engine.cancel_remote_deps();
    }

    /// Stop the workers and tear the engine down. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        if !self.finalized.swap(true, Ordering::AcqRel) {
            self.pool.shutdown()?;
            self.engine.fini();
        }
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Builds one task submission: action, phase, and dependencies.
pub struct TaskBuilder<'rt> {
    runtime: &'rt Runtime,
    action: Option<TaskAction>,
    phase: Phase,
    deps: Vec<Dep>,
}

impl TaskBuilder<'_> {
    /// Submit into an explicit phase instead of the runtime's current one.
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn dep(mut self, dep: Dep) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn deps(mut self, deps: impl IntoIterator<Item = Dep>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Hand the task to the runtime. It runs as soon as all its
    /// dependencies are satisfied and its phase is open.
    ///
    /// Tasks submitted from inside a running task become its children;
    /// top-level tasks are children of the root task.
    pub fn submit(mut self) -> Result<Arc<Task>, DepError> {
        let phase = self.phase.or_task(self.runtime.phase());
        let parent = context::current_task()
            .unwrap_or_else(|| Arc::clone(self.runtime.engine.root()));

        let task = Task::new(phase, Some(&parent), self.action.take());
        self.runtime.pool.submit(&task, &self.deps)?;
        Ok(task)
    }
}
