#![allow(dead_code)]

use crate::deps::DepEngine;
use crate::global::{GlobalPtr, IdentityMemory, Phase, SegmentId, UnitId};
use crate::remote::{LoopbackHub, RemoteTaskRef, Transport};
use crate::runtime::Schedule;
use crate::task::{CopyinDep, Dep, DepKind, Task, TaskDep, TaskState};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scheduler double that records what the engine enqueues instead of
/// running it, and submits real prefetch tasks for copy-in planning.
pub(crate) struct DummyScheduler {
    engine: Mutex<Weak<DepEngine>>,
    ready: Mutex<Vec<Arc<Task>>>,
    pub(crate) copyins_created: AtomicUsize,
}

impl DummyScheduler {
    pub(crate) fn new() -> Arc<DummyScheduler> {
        Arc::new(DummyScheduler {
            engine: Mutex::new(Weak::new()),
            ready: Mutex::new(Vec::new()),
            copyins_created: AtomicUsize::new(0),
        })
    }

    pub(crate) fn attach_engine(&self, engine: &Arc<DepEngine>) {
        *self.engine.lock() = Arc::downgrade(engine);
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    pub(crate) fn ready_tasks(&self) -> Vec<Arc<Task>> {
        self.ready.lock().clone()
    }

    pub(crate) fn was_enqueued(&self, task: &Arc<Task>) -> bool {
        self.ready.lock().iter().any(|t| Arc::ptr_eq(t, task))
    }

    pub(crate) fn enqueue_count(&self, task: &Arc<Task>) -> usize {
        self.ready
            .lock()
            .iter()
            .filter(|t| Arc::ptr_eq(t, task))
            .count()
    }
}

impl Schedule for DummyScheduler {
    fn enqueue_runnable(&self, task: Arc<Task>) {
        task.transition_to_queued();
        self.ready.lock().push(task);
    }

    fn make_ready(&self, task: Arc<Task>) {
        task.transition_to_queued();
        self.ready.lock().push(task);
    }

    fn create_copyin_task(&self, _copyin: &CopyinDep, dest: GlobalPtr, phase: Phase) -> Result<()> {
        self.copyins_created.fetch_add(1, Ordering::Relaxed);

        let engine = self
            .engine
            .lock()
            .upgrade()
            .expect("dummy scheduler used without an engine");
        let prefetch = Task::new(phase, Some(engine.root()), None);
        let out = Dep::Data(TaskDep::new(DepKind::Out, dest, phase));
        engine.handle_task(&prefetch, &[out])?;
        if prefetch.is_runnable() {
            self.enqueue_runnable(prefetch);
        }
        Ok(())
    }
}

/// One unit under test: an engine over a loopback endpoint, enqueueing into
/// a recording scheduler.
pub(crate) struct TestUnit {
    pub(crate) engine: Arc<DepEngine>,
    pub(crate) scheduler: Arc<DummyScheduler>,
}

impl TestUnit {
    pub(crate) fn new(hub: &Arc<LoopbackHub>, unit: UnitId) -> TestUnit {
        let transport: Arc<dyn Transport> = Arc::new(hub.endpoint(unit));
        let engine = DepEngine::new(transport, Arc::new(IdentityMemory));
        let scheduler = DummyScheduler::new();
        scheduler.attach_engine(&engine);

        let scheduler_dyn: Arc<dyn Schedule> = Arc::clone(&scheduler) as Arc<dyn Schedule>;
        let weak: Weak<dyn Schedule> = Arc::downgrade(&scheduler_dyn);
        engine.bind_scheduler(weak);

        TestUnit { engine, scheduler }
    }

    /// A single-unit fixture.
    pub(crate) fn solo() -> TestUnit {
        TestUnit::new(&LoopbackHub::new(1), UnitId(0))
    }

    /// Submit a task with dependencies the way the worker pool would: handle
    /// the dependencies, then enqueue if nothing is unresolved.
    pub(crate) fn submit(&self, phase: Phase, deps: &[Dep]) -> Arc<Task> {
        let task = Task::new(phase, Some(self.engine.root()), None);
        self.engine
            .handle_task(&task, deps)
            .expect("dependency handling failed");
        if task.is_runnable() {
            self.engine_enqueue(&task);
        }
        task
    }

    /// Like `submit` but tolerating dependency errors (they are part of what
    /// some tests assert).
    pub(crate) fn try_submit(
        &self,
        phase: Phase,
        deps: &[Dep],
    ) -> (Arc<Task>, Result<(), crate::deps::DepError>) {
        let task = Task::new(phase, Some(self.engine.root()), None);
        let res = self.engine.handle_task(&task, deps);
        if task.is_runnable() {
            self.engine_enqueue(&task);
        }
        (task, res)
    }

    /// Submit without the immediate-enqueue step: the task stays `Created`,
    /// the way a phase-gated pool would leave a future-phase task parked.
    pub(crate) fn submit_gated(&self, phase: Phase, deps: &[Dep]) -> Arc<Task> {
        let task = Task::new(phase, Some(self.engine.root()), None);
        self.engine
            .handle_task(&task, deps)
            .expect("dependency handling failed");
        task
    }

    fn engine_enqueue(&self, task: &Arc<Task>) {
        self.scheduler.enqueue_runnable(Arc::clone(task));
    }

    /// Drive a task to completion the way a worker would, releasing its
    /// successors.
    pub(crate) fn finish(&self, task: &Arc<Task>) {
        {
            let mut inner = task.inner.lock();
            assert!(inner.state.is_active(), "finishing an inactive task");
            inner.state = TaskState::Finished;
        }
        self.engine.release_local_task(task);
    }
}

pub(crate) fn gptr(unit: u32, segment: i16, addr: u64) -> GlobalPtr {
    GlobalPtr::new(UnitId(unit), SegmentId(segment), addr)
}

pub(crate) fn remote_ref(task: &Arc<Task>) -> RemoteTaskRef {
    RemoteTaskRef::from(task.id())
}
