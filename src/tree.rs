mod build;

/// The graph compiler and its errors.
pub use crate::tree::build::{BuildError, TaskTreeBuilder};
use crate::{
    sync::{AtomicUsize, Ordering},
    task::{BasicTask, SplitTask, TaskKind, Work},
    types::{HashMap, NodeIndex, Priority, SyncUnsafeCell, TaskId},
    utils::PanicMessage,
};
use core::{cmp::Ordering as CmpOrdering, num::NonZeroUsize};
use derive_more::{Debug, Display};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;

/// A compiled, immutable task graph that can be run any number of times.
///
/// Produced by [`TaskTreeBuilder::build`]. The topology (successor lists, root
/// list, requirement counts) is fixed; only the shard count of split tasks may
/// be changed between runs via [`TaskTree::set_shards`].
///
/// Running requires `&mut TaskTree`, so a tree can never be run by two
/// executors at once, nor reconfigured while a run is in progress.
#[must_use]
#[derive(Debug)]
pub struct TaskTree {
    pub(crate) inner: Arc<TreeInner>,
}

/// Errors returned by [`TaskTree::set_shards`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShardError {
    /// The tree has no task with this id.
    #[error("task {0} is not part of this tree")]
    UnknownTask(TaskId),
    /// The task exists but is not a split task.
    #[error("task {0} is not a split task")]
    NotSplit(TaskId),
}

#[derive(Debug)]
pub(crate) struct TreeInner {
    nodes: Box<[Node]>,
    /// Indexes of tasks without requirements, by descending priority.
    roots: Box<[NodeIndex]>,
    task_id_to_index: HashMap<TaskId, NodeIndex>,
}

#[derive(Debug)]
pub(crate) struct Node {
    id: TaskId,
    priority: Priority,
    /// Indexes of the tasks that require this one, by descending priority.
    /// A task listed `n` times in its requirements appears `n` times here.
    successors: Box<[NodeIndex]>,
    /// Number of requirements, fixed at build time.
    requirements: usize,
    unlocks: UnlockCounter,
    work: NodeWork,
}

/// Completed requirements in the current run.
#[derive(Debug)]
#[repr(align(128))]
struct UnlockCounter(AtomicUsize);

#[derive(Debug)]
enum NodeWork {
    Basic {
        affine: bool,
        #[debug(skip)]
        task: SyncUnsafeCell<Box<dyn BasicTask>>,
    },
    Split(SplitWork),
}

#[derive(Debug)]
struct SplitWork {
    /// Only written through `&mut TaskTree`, i.e. between runs.
    shards: AtomicUsize,
    counters: ShardCounters,
    #[debug(skip)]
    task: SyncUnsafeCell<Box<dyn SplitTask>>,
}

#[derive(Debug)]
#[repr(align(128))]
struct ShardCounters {
    /// Next shard index to hand out.
    next: AtomicUsize,
    /// Shards that have returned in the current run.
    finished: AtomicUsize,
}

/// Thread that executes a task, for diagnostics.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Lane {
    /// The thread that called `Executor::run`.
    #[display("caller")]
    Caller,
    #[display("worker-{_0}")]
    Worker(usize),
}

/// Queue entry: one task (or one shard of a split task) ready to run.
///
/// Orders by priority; among equal priorities the lower index (earlier
/// registration) is greater, so a max-heap pops it first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Ready {
    pub(crate) priority: Priority,
    pub(crate) index: NodeIndex,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl TaskTree {
    pub(crate) fn new(
        nodes: Vec<Node>,
        roots: Vec<NodeIndex>,
        task_id_to_index: HashMap<TaskId, NodeIndex>,
    ) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                nodes: nodes.into_boxed_slice(),
                roots: roots.into_boxed_slice(),
                task_id_to_index,
            }),
        }
    }

    /// Number of logical tasks. A split task counts once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `true` for the tree built from an empty builder; running it is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    /// Ids of the immediately runnable tasks, by descending priority.
    pub fn roots(&self) -> impl ExactSizeIterator<Item = TaskId> + '_ {
        self.inner
            .roots
            .iter()
            .map(|&index| self.inner.nodes[index].id)
    }

    /// Whether a task with this id was compiled into the tree.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.task_id_to_index.contains_key(&id)
    }

    /// Capability of the task with this id.
    #[must_use]
    pub fn kind(&self, id: TaskId) -> Option<TaskKind> {
        self.inner.node(id).map(Node::kind)
    }

    /// Current shard count of a split task.
    #[must_use]
    pub fn shards(&self, id: TaskId) -> Option<NonZeroUsize> {
        match &self.inner.node(id)?.work {
            NodeWork::Split(split) => NonZeroUsize::new(split.shards.load(Ordering::Relaxed)),
            NodeWork::Basic { .. } => None,
        }
    }

    /// Change the shard count of a split task for subsequent runs.
    ///
    /// Calls [`SplitTask::resize`] if the count actually changes.
    ///
    /// # Errors
    /// If `id` is unknown or does not refer to a split task.
    pub fn set_shards(&mut self, id: TaskId, shards: NonZeroUsize) -> Result<(), ShardError> {
        let node = self.inner.node(id).ok_or(ShardError::UnknownTask(id))?;
        let NodeWork::Split(split) = &node.work else {
            return Err(ShardError::NotSplit(id));
        };
        if split.shards.swap(shards.get(), Ordering::Relaxed) != shards.get() {
            // SAFETY: `&mut self` excludes any run of this tree. Executors may
            // still hold clones of the inner `Arc` for a moment after a run
            // returns, but they no longer touch task bodies at that point.
            unsafe { split.task.with_mut(|ptr| (*ptr).resize(shards)) };
        }
        Ok(())
    }
}

impl TreeInner {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub(crate) fn node_at(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    fn node(&self, id: TaskId) -> Option<&Node> {
        let &index = self.task_id_to_index.get(&id)?;
        Some(&self.nodes[index])
    }

    /// Run one popped queue entry and, if it completed its logical task, call
    /// `finish` and unlock its successors. `unlocked` receives every successor
    /// that became ready. Returns whether the logical task completed.
    ///
    /// # Safety
    ///
    /// `index` must come from a queue entry produced for the current run: each
    /// basic task is popped once per run, each split task once per shard. No
    /// other run of this tree may be in progress.
    pub(crate) unsafe fn step(
        &self,
        index: NodeIndex,
        lane: Lane,
        mut unlocked: impl FnMut(NodeIndex),
    ) -> bool {
        let node = &self.nodes[index];
        // SAFETY: forwarded from the caller.
        unsafe { node.run(lane) };
        if !node.complete() {
            return false;
        }
        // SAFETY: `complete` returned `true` for exactly one entry of this run,
        // after every other entry of the task returned.
        unsafe { node.finish(lane) };
        for &successor in &node.successors {
            if self.nodes[successor].unlock() {
                unlocked(successor);
            }
        }
        true
    }
}

impl Node {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        successors: Vec<NodeIndex>,
        requirements: usize,
        work: Work,
    ) -> Self {
        let work = match work {
            Work::Basic(task) => NodeWork::Basic {
                affine: false,
                task: SyncUnsafeCell::new(task),
            },
            Work::Draw(task) => NodeWork::Basic {
                affine: true,
                task: SyncUnsafeCell::new(task),
            },
            Work::Split { shards, task } => NodeWork::Split(SplitWork {
                shards: AtomicUsize::new(shards.get()),
                counters: ShardCounters {
                    next: AtomicUsize::new(0),
                    finished: AtomicUsize::new(0),
                },
                task: SyncUnsafeCell::new(task),
            }),
        };
        Self {
            id,
            priority,
            successors: successors.into_boxed_slice(),
            requirements,
            unlocks: UnlockCounter(AtomicUsize::new(0)),
            work,
        }
    }

    fn kind(&self) -> TaskKind {
        match self.work {
            NodeWork::Basic { affine: false, .. } => TaskKind::Basic,
            NodeWork::Basic { affine: true, .. } => TaskKind::Draw,
            NodeWork::Split(_) => TaskKind::Split,
        }
    }

    /// Must run on the thread that called `Executor::run`.
    pub(crate) fn is_affine(&self) -> bool {
        matches!(self.work, NodeWork::Basic { affine: true, .. })
    }

    /// Queue entry for this task, and how many times it must be queued.
    pub(crate) fn ready(&self, index: NodeIndex) -> (Ready, usize) {
        let copies = match &self.work {
            NodeWork::Basic { .. } => 1,
            NodeWork::Split(split) => split.shards.load(Ordering::Relaxed),
        };
        let ready = Ready {
            priority: self.priority,
            index,
        };
        (ready, copies)
    }

    /// # Safety
    ///
    /// Basic tasks: at most one call per run, and none concurrent with
    /// `finish`. Split tasks: at most `shards` calls per run.
    unsafe fn run(&self, lane: Lane) {
        let outcome = match &self.work {
            NodeWork::Basic { task, .. } => panic::catch_unwind(AssertUnwindSafe(|| {
                // SAFETY: the caller guarantees exclusive access for this run.
                unsafe { task.with_mut(|ptr| (*ptr).run()) }
            })),
            NodeWork::Split(split) => {
                let shard = split.counters.next.fetch_add(1, Ordering::Relaxed);
                panic::catch_unwind(AssertUnwindSafe(|| {
                    // SAFETY: shards only get shared access; `SplitTask: Sync`.
                    unsafe { split.task.with(|ptr| (*ptr).run_shard(shard)) }
                }))
            }
        };
        if let Err(payload) = outcome {
            tracing::error!(
                task = self.id,
                %lane,
                panic = payload.message(),
                "task panicked; treating it as complete"
            );
        }
    }

    /// Whether the entry just run completed the logical task. For split tasks
    /// exactly one entry per run observes `true`, and that observation resets
    /// the shard counters for the next run.
    fn complete(&self) -> bool {
        match &self.work {
            NodeWork::Basic { .. } => true,
            NodeWork::Split(split) => {
                let shards = split.shards.load(Ordering::Relaxed);
                let finished = split.counters.finished.fetch_add(1, Ordering::AcqRel) + 1;
                if finished != shards {
                    return false;
                }
                split.counters.next.store(0, Ordering::Relaxed);
                split.counters.finished.store(0, Ordering::Relaxed);
                true
            }
        }
    }

    /// # Safety
    ///
    /// Only after `complete` returned `true` for this run.
    unsafe fn finish(&self, lane: Lane) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &self.work {
            // SAFETY: `run` of this task already returned on this thread.
            NodeWork::Basic { task, .. } => unsafe { task.with_mut(|ptr| (*ptr).finish()) },
            // SAFETY: every shard returned before `complete` observed the last one
            // (acquire on `finished`), so this is the only access.
            NodeWork::Split(split) => unsafe { split.task.with_mut(|ptr| (*ptr).finish()) },
        }));
        if let Err(payload) = outcome {
            tracing::error!(
                task = self.id,
                %lane,
                panic = payload.message(),
                "task finish panicked"
            );
        }
    }

    /// Record one completed requirement. Returns `true` for exactly one call
    /// per run: the one completing the last requirement. That call also resets
    /// the counter for the next run.
    fn unlock(&self) -> bool {
        let unlocked = self.unlocks.0.fetch_add(1, Ordering::AcqRel) + 1;
        if unlocked != self.requirements {
            return false;
        }
        self.unlocks.0.store(0, Ordering::Relaxed);
        true
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::task::TaskNode;
    use std::sync::{Mutex, atomic::AtomicUsize as StdAtomicUsize};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    struct Resizable(Arc<Mutex<Vec<usize>>>);

    impl SplitTask for Resizable {
        fn run_shard(&self, _: usize) {}

        fn resize(&mut self, shards: NonZeroUsize) {
            self.0.lock().unwrap().push(shards.get());
        }
    }

    fn tree_with_split(resizes: Arc<Mutex<Vec<usize>>>) -> TaskTree {
        let mut builder = TaskTreeBuilder::new();
        builder
            .add(TaskNode::split(1, 0, nz(2), Resizable(resizes)))
            .unwrap();
        builder.add(TaskNode::basic(2, 0, || {}).requires(1)).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn set_shards_calls_resize_only_on_change() {
        let resizes = Arc::new(Mutex::new(vec![]));
        let mut tree = tree_with_split(resizes.clone());
        assert_eq!(tree.shards(1), Some(nz(2)));

        tree.set_shards(1, nz(2)).unwrap();
        tree.set_shards(1, nz(5)).unwrap();
        assert_eq!(tree.shards(1), Some(nz(5)));
        assert_eq!(*resizes.lock().unwrap(), vec![5]);
    }

    #[test]
    fn set_shards_rejects_unknown_and_non_split_tasks() {
        let mut tree = tree_with_split(Arc::default());
        assert_eq!(tree.set_shards(7, nz(1)), Err(ShardError::UnknownTask(7)));
        assert_eq!(tree.set_shards(2, nz(1)), Err(ShardError::NotSplit(2)));
        assert_eq!(tree.shards(2), None);
        assert_eq!(tree.kind(2), Some(TaskKind::Basic));
    }

    #[test]
    fn unlock_fires_once_per_run_and_resets() {
        let node = Node::new(0, 0, vec![], 3, Work::Basic(Box::new(|| {})));
        for _ in 0..2 {
            assert!(!node.unlock());
            assert!(!node.unlock());
            assert!(node.unlock());
        }
    }

    #[test]
    fn split_completes_on_last_shard_only() {
        let runs = Arc::new(StdAtomicUsize::new(0));
        let counter = runs.clone();
        let node = Node::new(
            0,
            0,
            vec![],
            0,
            Work::Split {
                shards: nz(3),
                task: Box::new(move |_: usize| {
                    counter.fetch_add(1, Ordering::Relaxed);
                }),
            },
        );
        assert_eq!(node.ready(0).1, 3);
        for _ in 0..2 {
            let completions = (0..3)
                .map(|_| {
                    unsafe { node.run(Lane::Caller) };
                    node.complete()
                })
                .collect::<Vec<_>>();
            assert_eq!(completions, [false, false, true]);
        }
        assert_eq!(runs.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn ready_entries_order_by_priority() {
        let low = Ready {
            priority: -1,
            index: 0,
        };
        let high = Ready {
            priority: 5,
            index: 1,
        };
        assert!(high > low);
    }

    #[test]
    fn ready_ties_break_on_index_consistently_with_eq() {
        let first = Ready {
            priority: 2,
            index: 3,
        };
        let second = Ready {
            priority: 2,
            index: 8,
        };
        assert!(first > second);
        assert_ne!(first.cmp(&second), CmpOrdering::Equal);
        assert_eq!(first.cmp(&first), CmpOrdering::Equal);

        let mut heap = std::collections::BinaryHeap::from([second, first]);
        assert_eq!(heap.pop(), Some(first));
        assert_eq!(heap.pop(), Some(second));
    }
}
