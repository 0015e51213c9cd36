//! Worker Pool
//!
//! A fixed set of OS threads pulling jobs from a crossbeam channel. Each
//! accepted connection becomes one job and runs to completion on a single
//! worker. When every worker is busy, jobs queue in the channel; pool
//! exhaustion is the only back-pressure signal.
//!
//! ```text
//! accept loop ──execute──▶ [ unbounded channel ] ──▶ worker-0 … worker-N
//! ```

use crate::error::{Error, Result};
use crate::logging::{debug, error};
use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lower bound for the automatic worker count
pub const MIN_AUTO_WORKERS: usize = 2;

/// Upper bound for the automatic worker count
pub const MAX_AUTO_WORKERS: usize = 32;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How connections are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Handle connections inline on the accept thread
    SingleThreaded,
    /// Exactly `n` worker threads
    Fixed(usize),
    /// `clamp(cpu_count * 2, 2, 32)` worker threads
    Auto,
}

impl WorkerMode {
    /// Map the configured `workers` value: absent is auto, 0 is single-threaded.
    pub fn from_config(workers: Option<usize>) -> Self {
        match workers {
            None => WorkerMode::Auto,
            Some(0) => WorkerMode::SingleThreaded,
            Some(n) => WorkerMode::Fixed(n),
        }
    }

    /// Number of pool threads; 0 means no pool.
    pub fn worker_count(&self) -> usize {
        match self {
            WorkerMode::SingleThreaded => 0,
            WorkerMode::Fixed(n) => *n,
            WorkerMode::Auto => auto_worker_count(),
        }
    }
}

/// Get the number of CPU cores.
#[inline]
pub fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Blocking I/O leaves cores idle while waiting, so run two workers per core.
#[inline]
pub fn auto_worker_count() -> usize {
    (num_cpus() * 2).clamp(MIN_AUTO_WORKERS, MAX_AUTO_WORKERS)
}

/// Pool counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    panicked: AtomicU64,
    busy: AtomicUsize,
}

impl WorkerStats {
    /// Jobs that returned normally
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Jobs that panicked
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Workers currently running a job
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }
}

/// Fixed-size thread pool.
///
/// Dropping the pool closes the channel; workers drain queued jobs and are
/// joined.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl ThreadPool {
    /// Spawn `size` workers named `{name_prefix}-{index}`.
    pub fn new(size: usize, name_prefix: &str) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("thread pool needs at least one worker".into()));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let stats = Arc::new(WorkerStats::default());
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name_prefix, index))
                .spawn(move || worker_loop(index, receiver, stats))?;
            workers.push(handle);
        }

        debug!(workers = size, "Thread pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
            stats,
        })
    }

    /// Queue a job. Jobs wait in the channel while all workers are busy.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Internal("thread pool is shut down".into()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| Error::Internal("thread pool workers are gone".into()))
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a free worker
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop once the queue drains
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread exited abnormally");
            }
        }
    }
}

fn worker_loop(index: usize, receiver: Receiver<Job>, stats: Arc<WorkerStats>) {
    for job in receiver.iter() {
        stats.busy.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
        stats.busy.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                stats.panicked.fetch_add(1, Ordering::Relaxed);
                error!(worker = index, "Job panicked; worker continues");
            }
        }
    }
    debug!(worker = index, "Worker stopped");
}
