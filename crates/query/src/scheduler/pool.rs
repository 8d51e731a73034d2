//! Process-wide shared worker pool.
//!
//! The pool is created on first parallel use and sized to the machine's
//! available parallelism. Its lifecycle is independent of any single query
//! and strictly one-way: after `shutdown` no work is ever accepted again,
//! and there is no restart. Queries never fall back to sequential execution
//! when a submit fails; the error surfaces to the caller.

use rill_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    abandon: Arc<AtomicBool>,
}

static POOL: OnceLock<WorkerPool> = OnceLock::new();
static TERMINATED: AtomicBool = AtomicBool::new(false);

impl WorkerPool {
    fn start(threads: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let abandon = Arc::new(AtomicBool::new(false));

        let handles = (0..threads)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let abandon = Arc::clone(&abandon);
                thread::spawn(move || loop {
                    let job = {
                        let guard = match rx.lock() {
                            Ok(g) => g,
                            Err(_) => break,
                        };
                        guard.recv()
                    };
                    match job {
                        // Immediate shutdown abandons queued jobs; the
                        // result channel closing signals the waiter.
                        Ok(job) => {
                            if !abandon.load(Ordering::SeqCst) {
                                job();
                            }
                        }
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            abandon,
        }
    }
}

fn default_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// A pending task's result slot.
pub struct TaskHandle<T> {
    rx: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task's result is available.
    pub fn join(self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|_| Error::invalid_operation("worker task ended without a result"))
    }
}

/// Submits a task to the shared pool, creating the pool on first use.
/// Fails with `PoolShutdown` once `shutdown` has been called.
pub fn submit<T, F>(f: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if TERMINATED.load(Ordering::SeqCst) {
        return Err(Error::PoolShutdown);
    }
    let pool = POOL.get_or_init(|| WorkerPool::start(default_threads()));

    let sender = pool.sender.lock().map_err(|_| Error::PoolShutdown)?;
    let sender = sender.as_ref().ok_or(Error::PoolShutdown)?;

    let (tx, rx) = mpsc::channel();
    let job: Job = Box::new(move || {
        let _ = tx.send(f());
    });
    sender.send(job).map_err(|_| Error::PoolShutdown)?;
    Ok(TaskHandle { rx })
}

/// Shuts the pool down. Non-immediate shutdown waits for in-flight and
/// queued tasks to finish; immediate shutdown abandons queued tasks
/// best-effort (tasks already running complete). Either way the pool is
/// terminal: later submits fail and nothing restarts it.
pub fn shutdown(immediate: bool) {
    TERMINATED.store(true, Ordering::SeqCst);
    let pool = match POOL.get() {
        Some(p) => p,
        None => return,
    };
    if immediate {
        pool.abandon.store(true, Ordering::SeqCst);
    }
    // Dropping the sender closes the queue; workers exit after draining.
    if let Ok(mut sender) = pool.sender.lock() {
        *sender = None;
    }
    if let Ok(mut handles) = pool.handles.lock() {
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Returns true once `shutdown` has been called.
pub fn is_shut_down() -> bool {
    TERMINATED.load(Ordering::SeqCst)
}
