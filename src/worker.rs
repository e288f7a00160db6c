//! Worker pool (C3, §4.3).
//!
//! A single background executor draining a FIFO job queue; each job's
//! `execute` callback runs on the background thread, and its `notify`
//! callback is queued for the main thread to run later via
//! [`WorkerPool::pump_notifications`] — the single-threaded cooperative
//! main loop (§5) never runs arbitrary code off its own thread, it just
//! drains what the worker produced. Where a C worker pool would pass an
//! opaque `void *` parameter through both callbacks, idiomatic Rust lets
//! `execute` capture whatever it needs directly in its closure and return
//! the result; `notify` receives that result as a boxed `Any` it downcasts.
//!
//! Grounded on the teacher's dedicated-I/O-thread pattern
//! (`rpc/io_task.rs`: one background thread draining a queue, handing
//! results back to the control loop via a channel) generalized from a
//! fixed three-future reactor to a named FIFO job queue with context
//! gating, per §4.3/§5.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::{debug, warn};

type BoxedResult = Box<dyn Any + Send>;
type ExecuteFn = Box<dyn FnOnce() -> BoxedResult + Send>;
type NotifyFn = Box<dyn FnOnce(BoxedResult) + Send>;

struct Job {
    context: &'static str,
    name: &'static str,
    execute: ExecuteFn,
    notify: NotifyFn,
}

struct Completed {
    context: &'static str,
    name: &'static str,
    notify: NotifyFn,
    result: BoxedResult,
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    queue_cv: Condvar,
    notify_queue: Mutex<VecDeque<Completed>>,
    /// Guards the set of live context tags. Held for the full duration of
    /// an `execute` or `notify` callback (§5: "the mutex is held only
    /// while the callback runs"), so `add_context`/`remove_context` can
    /// never interleave with in-flight work under the same context.
    contexts: Mutex<HashSet<&'static str>>,
    shutdown: AtomicBool,
}

/// Offloads blocking work (sysfs probes, file writes) off the main loop.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            notify_queue: Mutex::new(VecDeque::new()),
            contexts: Mutex::new(HashSet::new()),
            shutdown: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("mce-worker".into())
            .spawn(move || Self::run(worker_shared))
            .expect("failed to spawn worker thread");
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Register a context tag. Jobs submitted under it (and not yet
    /// started) will run; jobs whose context was never registered are
    /// silently skipped.
    pub fn add_context(&self, name: &'static str) {
        self.shared.contexts.lock().unwrap().insert(name);
    }

    /// Unregister a context tag. Blocks until any in-flight `execute`/
    /// `notify` callback finishes (they hold the same mutex), so by the
    /// time this returns no callback under `name` can start.
    pub fn remove_context(&self, name: &'static str) {
        self.shared.contexts.lock().unwrap().remove(name);
    }

    pub fn has_context(&self, name: &'static str) -> bool {
        self.shared.contexts.lock().unwrap().contains(name)
    }

    /// Submit a job. `execute` runs on the background thread iff
    /// `context` is registered at the moment it would start; its return
    /// value is handed to `notify`, which runs on the main thread (via
    /// `pump_notifications`) iff `context` is *still* registered at that
    /// later moment.
    pub fn submit<E, N, R>(&self, context: &'static str, name: &'static str, execute: E, notify: N)
    where
        E: FnOnce() -> R + Send + 'static,
        N: FnOnce(R) + Send + 'static,
        R: Send + 'static,
    {
        let execute: ExecuteFn = Box::new(move || Box::new(execute()) as BoxedResult);
        let notify: NotifyFn = Box::new(move |boxed: BoxedResult| {
            match boxed.downcast::<R>() {
                Ok(r) => notify(*r),
                Err(_) => unreachable!("worker result type mismatch"),
            }
        });
        self.shared.queue.lock().unwrap().push_back(Job {
            context,
            name,
            execute,
            notify,
        });
        self.shared.queue_cv.notify_one();
    }

    /// Run every notify callback whose job already finished. Call this
    /// from the main loop after being woken for worker activity.
    pub fn pump_notifications(&self) {
        let completed: Vec<Completed> = {
            let mut q = self.shared.notify_queue.lock().unwrap();
            q.drain(..).collect()
        };
        for job in completed {
            let contexts = self.shared.contexts.lock().unwrap();
            if contexts.contains(job.context) {
                (job.notify)(job.result);
            } else {
                debug!(
                    "worker '{}': context '{}' gone, skipping notify",
                    job.name, job.context
                );
            }
            drop(contexts);
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut q = shared.queue.lock().unwrap();
                loop {
                    if shared.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(job) = q.pop_front() {
                        break job;
                    }
                    q = shared.queue_cv.wait(q).unwrap();
                }
            };

            let ran = {
                let contexts = shared.contexts.lock().unwrap();
                if contexts.contains(job.context) {
                    Some((job.execute)())
                } else {
                    debug!(
                        "worker '{}': context '{}' gone, skipping execute",
                        job.name, job.context
                    );
                    None
                }
            };

            if let Some(result) = ran {
                shared.notify_queue.lock().unwrap().push_back(Completed {
                    context: job.context,
                    name: job.name,
                    notify: job.notify,
                    result,
                });
            }
        }
    }

    /// Asynchronous cancellation: signal the background thread to stop
    /// after its current job and join it. After this returns, shared
    /// mutexes must not be touched again (§5).
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue_cv.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn job_runs_and_notifies_when_context_registered() {
        let pool = WorkerPool::new();
        pool.add_context("ctx");
        let (tx, rx) = mpsc::channel();
        pool.submit("ctx", "job", || 42, move |r: i32| tx.send(r).unwrap());
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, 42);
    }

    #[test]
    fn execute_skipped_when_context_not_registered() {
        let pool = WorkerPool::new();
        let (tx, rx) = mpsc::channel();
        pool.submit("unknown-ctx", "job", || 1, move |_: i32| tx.send(()).unwrap());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn notify_skipped_when_context_removed_before_pump() {
        let pool = WorkerPool::new();
        pool.add_context("ctx");
        let (tx, rx) = mpsc::channel::<()>();
        pool.submit("ctx", "job", || 7, move |_: i32| tx.send(()).unwrap());
        // Give execute a moment to finish and queue the notification.
        std::thread::sleep(Duration::from_millis(50));
        pool.remove_context("ctx");
        pool.pump_notifications();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn shutdown_joins_cleanly() {
        let mut pool = WorkerPool::new();
        pool.add_context("ctx");
        pool.submit("ctx", "job", || (), |_: ()| {});
        pool.shutdown();
    }
}
