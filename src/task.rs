use crate::types::{Priority, TaskId};
use core::num::NonZeroUsize;
use derive_more::{Debug, Display};

/// Logic of a basic (or draw) task.
///
/// `run` is invoked once per run of the owning tree, after every required task
/// has completed. `finish` is invoked right after `run` by the same thread.
pub trait BasicTask: Send {
    /// Perform the work of this task.
    fn run(&mut self);

    /// Called once after `run`. Rarely useful for basic tasks.
    fn finish(&mut self) {}
}

impl<F: FnMut() + Send> BasicTask for F {
    fn run(&mut self) {
        self()
    }
}

/// Logic of a split task: one logical task executed as several independent
/// shards, potentially on different threads at the same time.
///
/// `run_shard` is invoked exactly once for every shard index in
/// `0..shards` per run. `finish` is invoked exactly once per run, after every
/// shard has returned, and is the place to merge per-shard results.
pub trait SplitTask: Send + Sync {
    /// Perform the work of shard `shard`.
    fn run_shard(&self, shard: usize);

    /// Called once when all shards of this run have completed.
    fn finish(&mut self) {}

    /// Called by [`TaskTree::set_shards`](crate::TaskTree::set_shards) when the
    /// shard count changes between runs, e.g. to allocate per-shard state.
    fn resize(&mut self, shards: NonZeroUsize) {
        let _ = shards;
    }
}

impl<F: Fn(usize) + Send + Sync> SplitTask for F {
    fn run_shard(&self, shard: usize) {
        self(shard);
    }
}

/// Capability of a task as seen by the executors.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Runs on any thread.
    #[display("basic")]
    Basic,
    /// Always runs on the thread that called `Executor::run`.
    #[display("draw")]
    Draw,
    /// Fans out into shards that run on any thread, then fans back in.
    #[display("split")]
    Split,
}

pub(crate) enum Work {
    Basic(Box<dyn BasicTask>),
    Draw(Box<dyn BasicTask>),
    Split {
        shards: NonZeroUsize,
        task: Box<dyn SplitTask>,
    },
}

/// A task together with its scheduling metadata, ready to be added to a
/// [`TaskTreeBuilder`](crate::TaskTreeBuilder).
///
/// ```
/// use tasktree::{Executor, SequentialExecutor, TaskNode, TaskTreeBuilder};
///
/// let load = TaskNode::basic(0, 10, || println!("load"));
/// let mut draw = TaskNode::draw(1, 0, || println!("draw"));
/// draw.require_task(&load);
///
/// let mut builder = TaskTreeBuilder::new();
/// builder.add(load)?;
/// builder.add(draw)?;
/// let mut tree = builder.build()?;
/// SequentialExecutor::new().run(&mut tree);
/// # Ok::<(), tasktree::BuildError>(())
/// ```
#[must_use]
#[derive(Debug)]
pub struct TaskNode {
    id: TaskId,
    priority: Priority,
    required: Vec<TaskId>,
    #[debug(skip)]
    pub(crate) work: Work,
}

impl TaskNode {
    /// A task that may run on any thread.
    pub fn basic(id: TaskId, priority: Priority, task: impl BasicTask + 'static) -> Self {
        Self::new(id, priority, Work::Basic(Box::new(task)))
    }

    /// A task that only ever runs on the thread calling `Executor::run`, for
    /// work bound to a thread-local context such as a graphics context.
    pub fn draw(id: TaskId, priority: Priority, task: impl BasicTask + 'static) -> Self {
        Self::new(id, priority, Work::Draw(Box::new(task)))
    }

    /// A task split into `shards` independently runnable pieces.
    pub fn split(
        id: TaskId,
        priority: Priority,
        shards: NonZeroUsize,
        task: impl SplitTask + 'static,
    ) -> Self {
        let task = Box::new(task);
        Self::new(id, priority, Work::Split { shards, task })
    }

    fn new(id: TaskId, priority: Priority, work: Work) -> Self {
        Self {
            id,
            priority,
            required: Vec::new(),
            work,
        }
    }

    /// Require task `id` to complete before this task may run.
    ///
    /// The required task does not need to exist yet; it is resolved when the
    /// tree is built.
    pub fn require(&mut self, id: TaskId) -> &mut Self {
        self.required.push(id);
        self
    }

    /// Same as `self.require(task.id())`.
    pub fn require_task(&mut self, task: &TaskNode) -> &mut Self {
        self.require(task.id)
    }

    /// Builder-style variant of [`TaskNode::require`].
    pub fn requires(mut self, id: TaskId) -> Self {
        self.required.push(id);
        self
    }

    /// Identifier of this task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Scheduling priority of this task.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Ids of the required tasks, in insertion order.
    #[must_use]
    pub fn required(&self) -> &[TaskId] {
        &self.required
    }

    /// Capability of this task.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self.work {
            Work::Basic(_) => TaskKind::Basic,
            Work::Draw(_) => TaskKind::Draw,
            Work::Split { .. } => TaskKind::Split,
        }
    }

    /// Shard count of a split task, `None` for other kinds.
    #[must_use]
    pub fn shards(&self) -> Option<NonZeroUsize> {
        match self.work {
            Work::Split { shards, .. } => Some(shards),
            Work::Basic(_) | Work::Draw(_) => None,
        }
    }
}
