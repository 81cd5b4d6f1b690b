use crate::{
    task::TaskNode,
    tree::{Node, TaskTree},
    types::{HashMap, IndexMap, NodeIndex, TaskId},
};
use core::cmp::Reverse;
use indexmap::map::Entry;
use thiserror::Error;

/// Configuration errors detected while assembling a [`TaskTree`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// A task with the same id was already added.
    #[error("task id collision: {0}")]
    DuplicateId(TaskId),
    /// A task requires an id that was never added.
    #[error("task {task} requires task {missing}, which doesn't exist")]
    MissingDependency {
        /// The task declaring the requirement.
        task: TaskId,
        /// The id that could not be resolved.
        missing: TaskId,
    },
    /// Every task requires another task, so there is nowhere to start.
    #[error("no immediately runnable task (requirement loop)")]
    NoEntryPoint,
}

/// Factory of [`TaskTree`]s.
///
/// Add tasks with their requirements, then call [`TaskTreeBuilder::build`].
/// A successful build empties the builder, which can then be reused for the
/// next tree.
///
/// Only two structural checks are made: every required id must exist, and at
/// least one task must have no requirements. A requirement loop that leaves
/// some other task runnable is not detected; running such a tree hangs (or, on
/// the sequential executor, returns early and leaves the tree inconsistent).
#[must_use]
#[derive(Debug, Default)]
pub struct TaskTreeBuilder {
    tasks: IndexMap<TaskId, TaskNode>,
}

impl TaskTreeBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// # Errors
    /// [`BuildError::DuplicateId`] if a task with the same id was already
    /// added. The registered task is left untouched and `task` is dropped.
    pub fn add(&mut self, task: TaskNode) -> Result<(), BuildError> {
        match self.tasks.entry(task.id()) {
            Entry::Occupied(entry) => Err(BuildError::DuplicateId(*entry.key())),
            Entry::Vacant(entry) => {
                entry.insert(task);
                Ok(())
            }
        }
    }

    /// Number of tasks currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The registered task with this id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.get(&id)
    }

    /// Compile the registered tasks into a [`TaskTree`] and clear the builder.
    ///
    /// An empty builder yields an empty tree. On error nothing is consumed:
    /// the registry is left as it was, so it can be fixed and built again.
    ///
    /// # Errors
    /// - [`BuildError::MissingDependency`] if a required id was never added.
    /// - [`BuildError::NoEntryPoint`] if every task has a requirement.
    pub fn build(&mut self) -> Result<TaskTree, BuildError> {
        let Self { tasks } = self;

        // Phase 1: resolve requirement ids to indexes and invert them into
        // successor lists. Roots are the tasks without requirements.
        let mut successors: Vec<Vec<NodeIndex>> = vec![Vec::new(); tasks.len()];
        let mut roots = Vec::new();
        for (index, (&id, task)) in tasks.iter().enumerate() {
            if task.required().is_empty() {
                roots.push(index);
            }
            for &required in task.required() {
                let Some(parent) = tasks.get_index_of(&required) else {
                    return Err(BuildError::MissingDependency {
                        task: id,
                        missing: required,
                    });
                };
                successors[parent].push(index);
            }
        }
        if roots.is_empty() && !tasks.is_empty() {
            return Err(BuildError::NoEntryPoint);
        }

        // Phase 2: order roots and successors by descending priority, so that
        // ready tasks are queued (and unlocked) highest priority first.
        let priority_of = |&index: &NodeIndex| Reverse(tasks[index].priority());
        roots.sort_by_key(priority_of);
        for list in &mut successors {
            list.sort_by_key(priority_of);
        }

        // Phase 3: materialize the nodes. Draining clears the builder.
        let (nodes, task_id_to_index): (Vec<Node>, HashMap<TaskId, NodeIndex>) = tasks
            .drain(..)
            .zip(successors)
            .enumerate()
            .map(|(index, ((id, task), successors))| {
                let requirements = task.required().len();
                let node = Node::new(id, task.priority(), successors, requirements, task.work);
                (node, (id, index))
            })
            .unzip();

        tracing::debug!(
            tasks = nodes.len(),
            roots = roots.len(),
            "built task tree"
        );
        Ok(TaskTree::new(nodes, roots, task_id_to_index))
    }
}
