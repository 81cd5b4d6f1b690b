use crate::{
    executor::Executor,
    tree::{Lane, Ready, TaskTree, TreeInner},
    types::NodeIndex,
};
use std::collections::BinaryHeap;

/// Runs task trees on the calling thread, highest priority first.
///
/// No synchronization and no extra threads. The natural choice for a single
/// core, and a reference for the order-independent results of the pooled
/// executor.
#[must_use]
#[derive(Debug, Default)]
pub struct SequentialExecutor {
    queue: BinaryHeap<Ready>,
}

impl SequentialExecutor {
    /// A new executor with an empty ready queue.
    pub fn new() -> Self {
        Self::default()
    }
}

fn enqueue(queue: &mut BinaryHeap<Ready>, tree: &TreeInner, index: NodeIndex) {
    let (ready, copies) = tree.node_at(index).ready(index);
    queue.extend(core::iter::repeat_n(ready, copies));
}

impl Executor for SequentialExecutor {
    fn run(&mut self, tree: &mut TaskTree) {
        let Self { queue } = self;
        let tree = &*tree.inner;
        for &root in tree.roots() {
            enqueue(queue, tree, root);
        }
        while let Some(ready) = queue.pop() {
            // SAFETY: every entry was queued by this run, once per basic task
            // and once per shard; `&mut TaskTree` excludes other runs.
            unsafe { tree.step(ready.index, Lane::Caller, |next| enqueue(queue, tree, next)) };
        }
    }
}
