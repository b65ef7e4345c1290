use crate::deps::{DepEngine, DepError};
use crate::global::{GlobalPtr, Phase};
use crate::runtime::builder::RuntimeConfig;
use crate::runtime::context;
use crate::task::{CopyinDep, Dep, DepKind, Task, TaskAction, TaskDep, TaskState};
use anyhow::{Result, anyhow};
use crossbeam_deque::{Injector, Steal};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How long an idle worker parks between polls of the ready queue and the
/// transport.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// The worker-pool seam of the dependency engine.
///
/// `enqueue_runnable` is the phase-aware admission called when a task's
/// counters reach zero; `make_ready` bypasses the phase gate (deferred-queue
/// drains); `create_copyin_task` is the task-creation collaborator behind
/// copy-in planning.
pub trait Schedule: Send + Sync + 'static {
    fn enqueue_runnable(&self, task: Arc<Task>);

    fn make_ready(&self, task: Arc<Task>);

    fn create_copyin_task(&self, copyin: &CopyinDep, dest: GlobalPtr, phase: Phase) -> Result<()>;
}

/// Fixed pool of OS worker threads popping released tasks from a global
/// injector queue and feeding completions back into the release engine.
pub(crate) struct WorkerPool {
    cfg: RuntimeConfig,
    engine: Arc<DepEngine>,

    /// Ready tasks, stolen by whichever worker gets there first.
    injector: Injector<Arc<Task>>,

    idle_lock: Mutex<()>,
    wakeup: Condvar,
    shutdown: AtomicBool,

    /// Highest phase whose tasks may run; `i32::MAX` without phase gating.
    runnable_phase: AtomicI32,

    /// Tasks submitted but not yet finished, for `quiesce`.
    outstanding: AtomicUsize,
    quiesce_lock: Mutex<()>,
    quiesce_cv: Condvar,

    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(cfg: RuntimeConfig, engine: Arc<DepEngine>) -> Arc<WorkerPool> {
        let runnable_phase = if cfg.defer_future_phases {
            Phase::FIRST.0
        } else {
            i32::MAX
        };

        Arc::new(WorkerPool {
            cfg,
            engine,
            injector: Injector::new(),
            idle_lock: Mutex::new(()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            runnable_phase: AtomicI32::new(runnable_phase),
            outstanding: AtomicUsize::new(0),
            quiesce_lock: Mutex::new(()),
            quiesce_cv: Condvar::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn spawn_workers(self: &Arc<Self>) -> Result<()> {
        let num_workers = self.cfg.worker_threads;
        let barrier = Arc::new(Barrier::new(num_workers + 1));
        let mut handles = Vec::with_capacity(num_workers);

        for i in 0..num_workers {
            let mut builder = thread::Builder::new().name((self.cfg.thread_name.0)(i));
            if let Some(stack_size) = self.cfg.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }

            let pool = Arc::clone(self);
            let barrier = Arc::clone(&barrier);
            handles.push(builder.spawn(move || {
                barrier.wait();
                pool.worker_loop();
            })?);
        }

        // Spawning threads is async, wait for all of them to be started.
        barrier.wait();
        *self.handles.lock() = handles;
        Ok(())
    }

    fn worker_loop(&self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            match self.injector.steal() {
                Steal::Success(task) => self.run_task(task),
                Steal::Retry => {}
                Steal::Empty => {
                    // Pump the transport while idle so remote releases keep
                    // flowing even when no local work is left.
                    if let Err(e) = self.engine.progress() {
                        warn!(error = %e, "transport progress failed");
                    }
                    if !self.injector.is_empty() {
                        continue;
                    }

                    let mut guard = self.idle_lock.lock();
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    if self.injector.is_empty() {
                        let _ = self.wakeup.wait_for(&mut guard, PARK_TIMEOUT);
                    }
                }
            }
        }
    }

    fn run_task(&self, task: Arc<Task>) {
        let cancelled = {
            let mut inner = task.inner.lock();
            match inner.state {
                TaskState::Queued => {
                    inner.state = TaskState::Running;
                    false
                }
                TaskState::Cancelled => true,
                state => {
                    debug_assert!(false, "popped ready task in state {state:?}");
                    false
                }
            }
        };

        if !cancelled {
            if let Some(action) = task.take_action() {
                let _guard = context::TaskGuard::enter(Arc::clone(&task));
                action();
            }
            let mut inner = task.inner.lock();
            if inner.state == TaskState::Running {
                inner.state = TaskState::Finished;
            }
        }

        self.engine.release_local_task(&task);
        self.task_done();
    }

    /// Register a new task with the engine and enqueue it right away when it
    /// has nothing to wait for.
    pub(crate) fn submit(&self, task: &Arc<Task>, deps: &[Dep]) -> Result<(), DepError> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let res = self.engine.handle_task(task, deps);
        if task.is_runnable() {
            self.enqueue_runnable(Arc::clone(task));
        }
        res
    }

    /// Hand a task to the workers. The `Created -> Queued` transition makes
    /// this exactly-once; cancelled tasks still flow through the queue so
    /// the release engine sees them.
    pub(crate) fn push_ready(&self, task: Arc<Task>) {
        if task.transition_to_queued() || task.state() == TaskState::Cancelled {
            self.injector.push(task);
            self.wakeup.notify_one();
        } else {
            debug!(task = %task.id(), "skipping duplicate enqueue");
        }
    }

    pub(crate) fn set_runnable_phase(&self, phase: Phase) {
        self.runnable_phase.store(phase.0, Ordering::Release);
    }

    fn runnable_phase(&self) -> Phase {
        Phase(self.runnable_phase.load(Ordering::Acquire))
    }

    /// Block until every submitted task has finished. Only meaningful when
    /// no task is parked behind an uncommitted phase or an unanswered remote
    /// dependency.
    pub(crate) fn quiesce(&self) {
        let mut guard = self.quiesce_lock.lock();
        while self.outstanding.load(Ordering::Acquire) != 0 {
            let _ = self
                .quiesce_cv
                .wait_for(&mut guard, Duration::from_millis(5));
        }
    }

    fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.quiesce_lock.lock();
            self.quiesce_cv.notify_all();
        }
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            {
                let _guard = self.idle_lock.lock();
                self.wakeup.notify_all();
            }

            let handles: Vec<_> = self.handles.lock().drain(..).collect();
            let panicked = handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|result| result.is_err())
                .count();
            if panicked > 0 {
                return Err(anyhow!("{panicked} worker thread(s) panicked"));
            }
        }
        Ok(())
    }
}

impl Schedule for WorkerPool {
    fn enqueue_runnable(&self, task: Arc<Task>) {
        if self.cfg.defer_future_phases && task.phase() > self.runnable_phase() {
            self.engine.defer_task(task);
        } else {
            self.push_ready(task);
        }
    }

    fn make_ready(&self, task: Arc<Task>) {
        self.push_ready(task);
    }

    fn create_copyin_task(&self, copyin: &CopyinDep, dest: GlobalPtr, phase: Phase) -> Result<()> {
        // The submitting thread is also the one handling the consumer's
        // dependencies, so the prefetch lands in the same parent table.
        let parent = context::current_task().unwrap_or_else(|| Arc::clone(self.engine.root()));

        let memory = self.engine.memory();
        let CopyinDep { src, dest: dest_addr, len } = *copyin;
        let action: TaskAction = Box::new(move || {
            if let Err(e) = memory.get(src, dest_addr, len) {
                warn!(error = %e, "copy-in fetch failed");
            }
        });

        let task = Task::new(phase, Some(&parent), Some(action));
        debug!(prefetch = %task.id(), %phase, "submitting copy-in prefetch task");
        let out = Dep::Data(TaskDep::new(DepKind::Out, dest, phase));
        self.submit(&task, &[out]).map_err(anyhow::Error::from)
    }
}
