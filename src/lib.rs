//! Dependency-aware task scheduler for frame loops and other latency-sensitive
//! applications.
//!
//! Work is described as a tree (really a DAG) of tasks with explicit
//! requirements, compiled once and then run as often as needed, e.g. once per
//! frame:
//! - Tasks come in three kinds: basic tasks run on any thread, draw tasks only
//!   on the thread that calls [`Executor::run`] (the one owning, say, a
//!   graphics context), and split tasks fan out into shards that run in
//!   parallel and fan back in to a single `finish` call.
//! - [`TaskTreeBuilder`] resolves requirement ids into successor lists once, so
//!   a run only touches per-task atomic counters: a task becomes ready when
//!   the last of its requirements increments its counter, and that same
//!   increment resets the counter for the next run.
//! - Two executors drive a tree: [`SequentialExecutor`] on the calling thread
//!   without any synchronization, and [`ThreadPoolExecutor`] on a fixed pool of
//!   workers plus the calling thread.
//!
//! Key modules:
//! - `task`: the [`BasicTask`] and [`SplitTask`] traits and [`TaskNode`], a task
//!   with its id, priority and requirements.
//! - `tree`: the builder and the compiled [`TaskTree`] with its run-time
//!   unlock protocol.
//! - `executor`: the [`Executor`] trait and its two implementations.
//! - `config`: [`ExecutorConfig`] for the thread pool.
//!
//! Quick start:
//! 1. Create tasks with [`TaskNode::basic`], [`TaskNode::draw`] or
//!    [`TaskNode::split`] and declare requirements with [`TaskNode::require`].
//! 2. Add them to a [`TaskTreeBuilder`] and call `build`.
//! 3. Call [`Executor::run`] on the tree as many times as needed.
//!
//! Running takes `&mut TaskTree`, so one tree is never run twice at the same
//! time and shard counts can only change between runs. A panicking task is
//! logged through `tracing` and treated as complete, so a run always reaches
//! the end of the tree. Requirement loops are not detected beyond the builder
//! checks: tasks on a loop never become ready, so a pooled run hangs and a
//! sequential run returns without them.

/// Configuration of the thread pool executor.
///
/// Exposes [`ExecutorConfig`] and the [`ConfigError`] it can produce.
pub mod config;
/// The sequential and thread pool executors.
///
/// Both consume a compiled [`TaskTree`] and drive it to completion, differing
/// only in how ready tasks are distributed over threads.
pub mod executor;
mod sync;
/// Task definitions: the traits implemented by user logic and [`TaskNode`].
pub mod task;
/// Building and inspecting compiled task trees.
///
/// Contains [`TaskTreeBuilder`], which validates requirement ids and computes
/// successor lists, and [`TaskTree`], the immutable result.
pub mod tree;
/// Core type aliases (task ids, priorities).
pub mod types;
mod utils;

pub use crate::{
    config::{ConfigError, ExecutorConfig},
    executor::{Executor, PoolError, SequentialExecutor, ThreadPoolExecutor},
    task::{BasicTask, SplitTask, TaskKind, TaskNode},
    tree::{BuildError, ShardError, TaskTree, TaskTreeBuilder},
    types::{Priority, TaskId},
};
