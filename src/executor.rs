mod pool;
mod queue;
mod sequential;

pub use crate::executor::{
    pool::{PoolError, ThreadPoolExecutor},
    sequential::SequentialExecutor,
};
use crate::tree::TaskTree;

/// Something that can run [`TaskTree`]s.
///
/// Starting from the roots, an executor runs every task whose requirements
/// have completed, until all tasks have completed; then `run` returns and the
/// tree is ready to be run again. A task never starts before all of its
/// required tasks have completed in the same run. Among ready tasks, higher
/// priorities are preferred, but the actual order in which independent tasks
/// start or complete is unspecified.
///
/// If the tree contains a requirement loop that the builder could not detect,
/// `run` may hang.
pub trait Executor {
    /// Run every task of `tree` once and return when all have completed.
    fn run(&mut self, tree: &mut TaskTree);

    /// Release any threads owned by the executor. Idempotent.
    fn shutdown(&mut self) {}
}
