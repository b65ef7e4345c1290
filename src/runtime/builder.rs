use crate::global::GlobalMemory;
use crate::remote::Transport;
use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn(usize) -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    ThreadNameFn(Arc::new(|i| format!("dagolo-worker-{i}")))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Configures a [`Runtime`] before it is built.
#[derive(Debug)]
pub struct Builder {
    /// The number of worker threads. Defaults to 1 worker per CPU core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    /// Park zero-dependency tasks of future phases until their phase is
    /// committed. Off by default: without phase gating every runnable task
    /// runs immediately.
    defer_future_phases: bool,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            defer_future_phases: false,
        }
    }

    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "Worker threads cannot be set to 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets the name of threads spawned by the runtime's worker pool.
    ///
    /// The default name is "dagolo-worker-{index}".
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move |_| val.clone()));
        self
    }

    /// Sets a function from worker index to thread name.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads. The platform may
    /// round it up to its minimal stack size.
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Enable phase gating: tasks submitted for a phase later than the last
    /// committed one are parked in the deferred queue even when they have no
    /// dependencies, and promoted by `Runtime::complete_phase`.
    pub fn defer_future_phases(mut self, val: bool) -> Self {
        self.defer_future_phases = val;
        self
    }

    /// Creates the configured [`Runtime`] on top of the given transport and
    /// global-memory collaborators. The returned runtime is ready to accept
    /// tasks.
    pub fn try_build(
        self,
        transport: Arc<dyn Transport>,
        memory: Arc<dyn GlobalMemory>,
    ) -> Result<Runtime> {
        let cfg: RuntimeConfig = self.try_into()?;
        Runtime::new(cfg, transport, memory)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

/// Validated runtime configuration, cloned into every worker.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) defer_future_phases: bool,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads must be greater than 0"));
        }
        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = builder
            .worker_threads
            .unwrap_or(thread::available_parallelism()?.get());

        let cfg = RuntimeConfig {
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            defer_future_phases: builder.defer_future_phases,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // Cloned and sent into each spawned worker.
    assert_impl_all!(RuntimeConfig: Send, Sync, Clone);

    #[test]
    fn test_config_from_builder() {
        let cfg: RuntimeConfig = Builder::new()
            .worker_threads(3)
            .thread_name("t")
            .defer_future_phases(true)
            .try_into()
            .unwrap();

        assert_eq!(cfg.worker_threads, 3);
        assert!(cfg.defer_future_phases);
        assert_eq!((cfg.thread_name.0)(7), "t");
    }

    #[test]
    #[should_panic(expected = "Worker threads cannot be set to 0")]
    fn test_zero_workers_rejected() {
        let _ = Builder::new().worker_threads(0);
    }
}
