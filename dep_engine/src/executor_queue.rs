use task_executor::Executor;

/// The parallel executor the coordinator dispatches task callbacks onto.
///
/// This is the engine's only concurrency dependency: `Engine::build` itself never spawns a
/// thread, it only ever hands a closure to `dispatch` and waits for messages to arrive back on
/// its completion channel. An embedder may supply any implementation; `task_executor::Executor`
/// (a `tokio` multi-threaded runtime) is the reference one, wired in below.
pub trait ExecutionQueue: Send + Sync {
    /// Run `job` on a worker thread. Must not block the calling (coordinator) thread.
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

impl ExecutionQueue for Executor {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        // Task callbacks are user code and are permitted to block (per the concurrency model,
        // "Tasks may block arbitrarily on external I/O"), so these go on the blocking pool
        // rather than cooperatively on the worker threads that also drive the runtime's own
        // futures.
        let _ = self.native_spawn_blocking(job);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn dispatch_runs_job_on_worker() {
        let executor = Executor::new_owned(1, 2, || {}).unwrap();
        let queue: &dyn ExecutionQueue = &executor;
        let (tx, rx) = mpsc::channel();
        queue.dispatch(Box::new(move || {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap(), 42);
    }
}
