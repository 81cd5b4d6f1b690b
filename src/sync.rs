#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::{
        cell::UnsafeCell,
        sync::{
            Condvar, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        thread::JoinHandle,
    };
    use std::io;

    /// `loom` threads are anonymous; the name is dropped.
    pub(crate) fn spawn_named(
        _name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        Ok(loom::thread::spawn(f))
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::{
        sync::{
            Condvar, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        thread::JoinHandle,
    };
    use std::{io, thread};

    /// `UnsafeCell` with the closure-based access API of `loom::cell::UnsafeCell`,
    /// so call sites compile unchanged under both configurations.
    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

    impl<T> UnsafeCell<T> {
        pub(crate) const fn new(val: T) -> Self {
            Self(core::cell::UnsafeCell::new(val))
        }

        #[inline]
        pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
            f(self.0.get())
        }

        #[inline]
        pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
            f(self.0.get())
        }
    }

    pub(crate) fn spawn_named(
        name: String,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(f)
    }
}

pub(crate) use imp::*;
