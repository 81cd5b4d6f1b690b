use crate::sync::{Condvar, Mutex};
use std::{collections::BinaryHeap, sync::PoisonError};

/// Blocking max-priority queue shared by the threads of a pool.
///
/// Besides items, `take` can return one of two signals:
/// - `wake`: one-shot. Consumed by the single `take` that observes it. Used to
///   tell the thread blocked in `Executor::run` that the run is complete.
/// - `close`: sticky. Every current and future `take` observes it once the
///   queue is drained. Used to stop the workers.
#[derive(Debug)]
pub(crate) struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items: BinaryHeap<T>,
    woken: bool,
    closed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Take<T> {
    Item(T),
    Woken,
    Closed,
}

impl<T: Ord + Clone> BlockingQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: BinaryHeap::new(),
                woken: false,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Push `copies` clones of `item` under a single lock.
    pub(crate) fn push(&self, item: T, copies: usize) {
        if copies == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .items
            .extend(core::iter::repeat_n(item, copies));
        drop(state);
        if copies == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// Block until an item or a signal is available. Items take precedence.
    pub(crate) fn take(&self) -> Take<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(item) = state.items.pop() {
                return Take::Item(item);
            }
            if state.closed {
                return Take::Closed;
            }
            if state.woken {
                state.woken = false;
                return Take::Woken;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn wake(&self) {
        self.signal(|state| state.woken = true);
    }

    pub(crate) fn close(&self) {
        self.signal(|state| state.closed = true);
    }

    fn signal(&self, set: impl FnOnce(&mut QueueState<T>)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        set(&mut state);
        drop(state);
        self.available.notify_all();
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn pops_highest_first() {
        let queue = BlockingQueue::new();
        queue.push(1, 1);
        queue.push(9, 2);
        queue.push(4, 1);
        let taken = (0..4).map(|_| queue.take()).collect::<Vec<_>>();
        assert_eq!(
            taken,
            [Take::Item(9), Take::Item(9), Take::Item(4), Take::Item(1)]
        );
    }

    #[test]
    fn wake_is_consumed_once() {
        let queue = BlockingQueue::<i32>::new();
        queue.wake();
        queue.push(3, 1);
        assert_eq!(queue.take(), Take::Item(3));
        assert_eq!(queue.take(), Take::Woken);
        queue.push(5, 1);
        assert_eq!(queue.take(), Take::Item(5));
    }

    #[test]
    fn wake_and_close_release_blocked_takers() {
        let queue = Arc::new(BlockingQueue::<i32>::new());
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.take())
        };
        queue.wake();
        assert_eq!(waiter.join().unwrap(), Take::Woken);

        let waiters = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.take())
            })
            .collect::<Vec<_>>();
        queue.close();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Take::Closed);
        }
        assert_eq!(queue.take(), Take::Closed);
    }
}
