use crate::{
    config::{ConfigError, ExecutorConfig},
    executor::{
        Executor,
        queue::{BlockingQueue, Take},
    },
    sync::{AtomicUsize, JoinHandle, Ordering, spawn_named},
    tree::{Lane, Ready, TaskTree, TreeInner},
    types::NodeIndex,
};
use core::cmp::Ordering as CmpOrdering;
use std::{io, sync::Arc};
use thiserror::Error;

/// Errors returned when starting a [`ThreadPoolExecutor`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}

/// Runs task trees on a fixed pool of worker threads plus the calling thread.
///
/// Basic tasks and split shards are executed by the workers. Draw tasks are
/// executed only by the thread that calls [`Executor::run`], which otherwise
/// blocks until the whole tree has completed. Workers are started by the
/// constructor and live until [`Executor::shutdown`] or drop.
///
/// A panicking task is logged and counted as complete, so the run still
/// terminates.
#[must_use]
#[derive(Debug)]
pub struct ThreadPoolExecutor {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct PoolShared {
    /// Basic tasks and shards, served by the workers.
    general: BlockingQueue<PoolTask>,
    /// Draw tasks, served by the thread inside `run`.
    affinity: BlockingQueue<PoolTask>,
    finished: FinishedCounter,
}

/// Logical tasks completed in the current run.
#[derive(Debug)]
#[repr(align(128))]
struct FinishedCounter(AtomicUsize);

/// A queue entry together with the tree it belongs to. Holding the `Arc`
/// keeps the tree alive for a worker that is still returning from its last
/// entry when `run` has already returned to the caller.
#[derive(Debug, Clone)]
struct PoolTask {
    ready: Ready,
    tree: Arc<TreeInner>,
}

impl PartialEq for PoolTask {
    fn eq(&self, other: &Self) -> bool {
        self.ready == other.ready
    }
}

impl Eq for PoolTask {}

impl Ord for PoolTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.ready.cmp(&other.ready)
    }
}

impl PartialOrd for PoolTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Progress {
    Running,
    /// This thread completed the last logical task of the run.
    Terminated,
}

impl ThreadPoolExecutor {
    /// Start the worker threads described by `config`.
    ///
    /// # Errors
    /// [`PoolError::Spawn`] if a worker thread cannot be spawned. Workers that
    /// were already started are shut down first.
    pub fn new(config: ExecutorConfig) -> Result<Self, PoolError> {
        let ExecutorConfig {
            threads,
            thread_name,
        } = config;
        let shared = Arc::new(PoolShared {
            general: BlockingQueue::new(),
            affinity: BlockingQueue::new(),
            finished: FinishedCounter(AtomicUsize::new(0)),
        });
        let mut executor = Self {
            shared,
            workers: Vec::with_capacity(threads.get()),
        };
        for worker in 0..threads.get() {
            let shared = Arc::clone(&executor.shared);
            let spawned = spawn_named(format!("{thread_name}-{worker}"), move || {
                shared.work(worker);
            });
            match spawned {
                Ok(handle) => executor.workers.push(handle),
                Err(err) => {
                    executor.shutdown();
                    return Err(PoolError::Spawn(err));
                }
            }
        }
        tracing::debug!(threads = threads.get(), "thread pool started");
        Ok(executor)
    }

    /// Start a pool of `threads` workers with otherwise default configuration.
    ///
    /// # Errors
    /// [`ConfigError::ZeroThreads`] if `threads` is 0, or
    /// [`PoolError::Spawn`] as for [`ThreadPoolExecutor::new`].
    pub fn with_threads(threads: usize) -> Result<Self, PoolError> {
        Self::new(ExecutorConfig::default().with_threads(threads)?)
    }

    /// Number of live worker threads; 0 after shutdown.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Executor for ThreadPoolExecutor {
    fn run(&mut self, tree: &mut TaskTree) {
        if self.workers.is_empty() {
            tracing::warn!("run called on a thread pool that was shut down");
            return;
        }
        let tree = &tree.inner;
        if tree.len() == 0 {
            return;
        }
        let shared = &*self.shared;
        for &root in tree.roots() {
            shared.dispatch(tree, root);
        }
        loop {
            match shared.affinity.take() {
                Take::Item(task) => {
                    if shared.execute(task, Lane::Caller) == Progress::Terminated {
                        return;
                    }
                }
                // A worker completed the last task.
                Take::Woken => return,
                Take::Closed => unreachable!("the affinity queue is never closed"),
            }
        }
    }

    fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.general.close();
        for (worker, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::error!(worker, "worker thread terminated abnormally");
            }
        }
        tracing::debug!("thread pool shut down");
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolShared {
    fn work(&self, worker: usize) {
        let lane = Lane::Worker(worker);
        tracing::trace!(%lane, "worker started");
        loop {
            match self.general.take() {
                Take::Item(task) => {
                    if self.execute(task, lane) == Progress::Terminated {
                        self.affinity.wake();
                    }
                }
                Take::Woken => {}
                Take::Closed => break,
            }
        }
        tracing::trace!(%lane, "worker stopped");
    }

    /// Queue a ready task once, or once per shard, on the queue matching its
    /// affinity.
    fn dispatch(&self, tree: &Arc<TreeInner>, index: NodeIndex) {
        let node = tree.node_at(index);
        let (ready, copies) = node.ready(index);
        let queue = if node.is_affine() {
            &self.affinity
        } else {
            &self.general
        };
        let tree = Arc::clone(tree);
        queue.push(PoolTask { ready, tree }, copies);
    }

    fn execute(&self, task: PoolTask, lane: Lane) -> Progress {
        let PoolTask { ready, tree } = task;
        // SAFETY: `ready` was queued by `dispatch` during the current run, once
        // per basic task and once per shard, and is popped exactly once.
        // `Executor::run` holds `&mut TaskTree` until the run completes.
        let completed =
            unsafe { tree.step(ready.index, lane, |next| self.dispatch(&tree, next)) };
        if !completed {
            return Progress::Running;
        }
        // The increment is the single decision point: exactly one thread
        // observes the transition to the total and terminates the run.
        let finished = self.finished.0.fetch_add(1, Ordering::AcqRel) + 1;
        if finished != tree.len() {
            return Progress::Running;
        }
        self.finished.0.store(0, Ordering::Relaxed);
        Progress::Terminated
    }
}
