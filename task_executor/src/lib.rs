// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
#![allow(clippy::mutex_atomic)]

//! The execution queue that runs dependency-engine tasks.
//!
//! This is the reference implementation of `dep_engine`'s `ExecutionQueue` trait: a
//! multi-threaded `tokio` runtime used to run task callbacks off of the coordinator thread,
//! giving the engine the "parallel-worker with serialized coordination" concurrency model
//! described in its concurrency design.

use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::FutureExt;
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};

///
/// Executors come in two flavors:
/// * "borrowed"
///     * Created with `Self::new()`, or `self::to_borrowed()`.
///     * A borrowed Executor will not be shut down when all handles are dropped, and shutdown
///       methods will have no impact.
///     * Used in unit tests where the Runtime is created by macros, and when an embedder wants
///       to share one Runtime across multiple engines.
/// * "owned"
///     * Created with `Self::new_owned()`.
///     * When all handles of an owned Executor are dropped, its Runtime will be shut down.
///       Additionally, the explicit shutdown methods can be used to shut down the Executor for
///       all clones.
///
#[derive(Debug, Clone)]
pub struct Executor {
    runtime: Arc<Mutex<Option<Runtime>>>,
    handle: Handle,
}

impl Executor {
    ///
    /// Creates an Executor for an existing tokio::Runtime (generally provided by tokio's macros).
    ///
    /// The returned Executor will have a lifecycle independent of the Runtime, meaning that
    /// dropping all clones of the Executor will not cause the Runtime to be shut down. Likewise,
    /// the owner of the Runtime must ensure that it is kept alive longer than all Executor
    /// instances, because existence of a Handle does not prevent a Runtime from shutting down.
    /// This is guaranteed by the scope of the tokio::{test, main} macros.
    ///
    pub fn new() -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: Handle::current(),
        }
    }

    ///
    /// Creates an owned Executor with its own tokio::Runtime, configured with the given thread
    /// counts.
    ///
    pub fn new_owned<F>(
        num_worker_threads: usize,
        max_threads: usize,
        on_thread_start: F,
    ) -> Result<Executor, String>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut runtime_builder = Builder::new_multi_thread();

        runtime_builder
            .worker_threads(num_worker_threads)
            .max_blocking_threads(max_threads - num_worker_threads)
            .enable_all();

        if env::var("DEP_ENGINE_DEBUG").is_ok() {
            runtime_builder.on_thread_start(on_thread_start);
        };

        let runtime = runtime_builder
            .build()
            .map_err(|e| format!("Failed to start the runtime: {e}"))?;

        let handle = runtime.handle().clone();
        Ok(Executor {
            runtime: Arc::new(Mutex::new(Some(runtime))),
            handle,
        })
    }

    ///
    /// Creates a clone of this Executor which is disconnected from shutdown events. See the
    /// `Executor` rustdoc.
    ///
    pub fn to_borrowed(&self) -> Executor {
        Self {
            runtime: Arc::new(Mutex::new(None)),
            handle: self.handle.clone(),
        }
    }

    ///
    /// Enter the runtime context associated with this Executor. Useful for threads not started
    /// by the runtime that still need access to it via task-local variables.
    ///
    pub fn enter<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _context = self.handle.enter();
        f()
    }

    ///
    /// Run a Future on a tokio Runtime as a new Task, and return a Future handle to it.
    ///
    /// If the background Task exits abnormally, the given closure will be called to recover:
    /// usually it should convert the resulting Error to a relevant error type.
    ///
    pub fn spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
        rescue_join_error: impl FnOnce(JoinError) -> O,
    ) -> impl Future<Output = O> {
        self.native_spawn(future).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    ///
    /// Run a Future on a tokio Runtime as a new Task, and return a JoinHandle.
    ///
    pub fn native_spawn<O: Send + 'static, F: Future<Output = O> + Send + 'static>(
        &self,
        future: F,
    ) -> JoinHandle<O> {
        self.handle.spawn(future)
    }

    ///
    /// Run a Future and return its resolved Result.
    ///
    /// This should never be called from within a Future context, and should only ever be called
    /// in something that resembles a main method.
    ///
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    ///
    /// Spawn a closure on a threadpool specifically reserved for work which is allowed to be
    /// long-running or blocking, such as a Task's computation after `inputsAvailable`.
    ///
    pub fn spawn_blocking<F: FnOnce() -> R + Send + 'static, R: Send + 'static>(
        &self,
        f: F,
        rescue_join_error: impl FnOnce(JoinError) -> R,
    ) -> impl Future<Output = R> {
        self.native_spawn_blocking(f).map(|res| match res {
            Ok(o) => o,
            Err(e) => rescue_join_error(e),
        })
    }

    ///
    /// Spawn a closure on threads specifically reserved for long-running or blocking work, and
    /// return a JoinHandle.
    ///
    pub fn native_spawn_blocking<F: FnOnce() -> R + Send + 'static, R: Send + 'static>(
        &self,
        f: F,
    ) -> JoinHandle<R> {
        self.handle.spawn_blocking(f)
    }

    /// Return a reference to this executor's runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    ///
    /// A blocking call to shut down the Runtime associated with this "owned" Executor. If tasks
    /// do not shut down within the given timeout, they are leaked.
    ///
    /// This method has no effect for "borrowed" Executors: see the `Executor` rustdoc.
    ///
    pub fn shutdown(&self, timeout: Duration) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        let start = Instant::now();
        runtime.shutdown_timeout(timeout + Duration::from_millis(250));
        if start.elapsed() > timeout {
            log::warn!("Executor shutdown took unexpectedly long: tasks were likely leaked!");
        }
    }

    /// Returns true if `shutdown` has been called for this Executor. Always returns true for
    /// borrowed Executors.
    pub fn is_shutdown(&self) -> bool {
        self.runtime.lock().is_none()
    }
}

/// Tracks in-flight task-callback jobs that a graceful engine shutdown must drain before
/// destroying the `RuleInfo`/`TaskInfo` tables (see the engine's concurrency design: "Graceful
/// shutdown of the owning engine drains the queue and destroys all TaskInfo and RuleInfo
/// records.").
#[derive(Clone)]
pub struct DrainingTasks {
    inner: Arc<Mutex<Option<DrainingTasksInner>>>,
}

struct DrainingTasksInner {
    id_to_name: HashMap<Id, String>,
    task_set: JoinSet<()>,
}

impl DrainingTasks {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(DrainingTasksInner {
                id_to_name: HashMap::new(),
                task_set: JoinSet::new(),
            }))),
        }
    }

    /// Spawn a job that must complete before `wait` returns.
    pub fn spawn_on<F>(&self, name: &str, handle: &Handle, job: F)
    where
        F: Future<Output = ()>,
        F: Send + 'static,
    {
        let mut guard = self.inner.lock();
        let inner = match &mut *guard {
            Some(inner) => inner,
            None => {
                log::warn!("Shutdown job `{name}` submitted after drain completed.");
                return;
            }
        };

        let h = inner.task_set.spawn_on(job, handle);
        inner.id_to_name.insert(h.id(), name.to_string());
    }

    /// Wait for all pending jobs to complete, subject to the given timeout.
    pub async fn wait(self, timeout: Duration) {
        let mut inner = match self.inner.lock().take() {
            Some(inner) => inner,
            None => {
                log::debug!("Drain awaited multiple times!");
                return;
            }
        };

        if inner.task_set.is_empty() {
            return;
        }

        log::debug!("waiting for {} job(s) to drain", inner.task_set.len());

        let mut timeout = tokio::time::sleep(timeout).boxed();

        loop {
            tokio::select! {
              biased;

              _ = &mut timeout => break,

              next_result = inner.task_set.join_next_with_id() => {
                match next_result {
                  Some(Ok((id, _))) => {
                    if let Some(name) = inner.id_to_name.get(&id) {
                      log::trace!("Job `{name}` drained successfully");
                    }
                    inner.id_to_name.remove(&id);
                  },
                  Some(Err(err)) => {
                    let name = inner.id_to_name.get(&err.id());
                    log::error!("Job `{name:?}` panicked during drain: {err:?}");
                  }
                  None => break,
                }
              }
            }
        }

        if !inner.task_set.is_empty() {
            log::warn!(
                "{} job(s) did not drain within timeout: {}",
                inner.task_set.len(),
                inner.id_to_name.values().join(", "),
            );
            inner.task_set.abort_all();
        }
    }
}
