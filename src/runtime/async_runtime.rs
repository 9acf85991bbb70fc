//! Runner for `go` statements. Each goroutine gets its own OS thread; the
//! runner keeps the handles so the host can wait for every task to finish.

use crate::runtime::error::RuntimeResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

#[derive(Default)]
pub struct TaskRunner {
    handles: Mutex<Vec<JoinHandle<()>>>,
    spawned: AtomicUsize,
    failed: Arc<AtomicUsize>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `task` on a named helper thread. A task that fails is logged
    /// and counted; it never tears down the program that spawned it.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() -> RuntimeResult<()> + Send + 'static,
    {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("goroutine-{id}");
        let failed = self.failed.clone();
        let result = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(task = %name, "goroutine started");
            if let Err(err) = task() {
                failed.fetch_add(1, Ordering::Relaxed);
                error!(task = %name, error = %err, "goroutine panicked");
                return;
            }
            debug!(task = %name, "goroutine finished");
        });
        match result {
            Ok(handle) => self.handles.lock().push(handle),
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "failed to start goroutine thread");
            }
        }
    }

    /// Waits for every task, including tasks started while waiting.
    pub fn join_all(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!("goroutine thread aborted");
                }
            }
        }
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::RuntimeError;

    #[test]
    fn join_all_waits_for_nested_tasks_and_counts_failures() {
        let runner = Arc::new(TaskRunner::new());
        let done = Arc::new(AtomicUsize::new(0));
        let nested_runner = runner.clone();
        let nested_done = done.clone();
        runner.spawn(move || {
            let inner_done = nested_done.clone();
            nested_runner.spawn(move || {
                inner_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            nested_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        runner.spawn(|| Err(RuntimeError::panic("boom")));
        runner.join_all();
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(runner.spawned(), 3);
        assert_eq!(runner.failed(), 1);
    }
}
