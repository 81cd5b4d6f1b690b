use crate::sync::UnsafeCell;
use derive_more::Deref;
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap as _HashMap;

/// Caller-assigned identifier of a task.
///
/// Unique within one [`TaskTreeBuilder`](crate::TaskTreeBuilder); used only to
/// wire dependencies, never as runtime identity.
pub type TaskId = u32;

/// Relative scheduling priority. Larger values run earlier among ready tasks.
pub type Priority = i32;

/// Position of a task inside a compiled tree.
pub(crate) type NodeIndex = usize;

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
pub(crate) type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send`.
///
/// Holds task bodies inside a compiled tree. The scheduler never hands out
/// overlapping mutable access: a basic task body is touched by one thread per
/// run, and a split task body is only borrowed mutably after all of its shards
/// have completed. Shared access to split bodies additionally relies on
/// `SplitTask: Sync`.
#[derive(Deref)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}
