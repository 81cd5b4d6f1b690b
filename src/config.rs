use core::num::NonZeroUsize;
use std::thread;
use thiserror::Error;

/// Invalid executor configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A thread pool needs at least one worker.
    #[error("minimum threads: 1")]
    ZeroThreads,
}

/// Configuration of a [`ThreadPoolExecutor`](crate::ThreadPoolExecutor).
///
/// The pool runs `threads` workers for basic and split tasks, plus the thread
/// calling `run`, which executes draw tasks. With many or heavy draw tasks it
/// may pay off to use one worker less than there are cores.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    pub threads: NonZeroUsize,
    /// Worker threads are named `"{thread_name}-{index}"`.
    pub thread_name: String,
}

impl ExecutorConfig {
    /// Set the number of worker threads.
    ///
    /// # Errors
    /// [`ConfigError::ZeroThreads`] if `threads` is 0.
    pub fn with_threads(self, threads: usize) -> Result<Self, ConfigError> {
        let threads = NonZeroUsize::new(threads).ok_or(ConfigError::ZeroThreads)?;
        Ok(Self { threads, ..self })
    }

    /// Set the prefix of worker thread names.
    pub fn with_thread_name(self, thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            ..self
        }
    }
}

impl Default for ExecutorConfig {
    /// One worker per available core.
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            thread_name: "tasktree-worker".to_owned(),
        }
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        assert_eq!(
            ExecutorConfig::default().with_threads(0),
            Err(ConfigError::ZeroThreads)
        );
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = ExecutorConfig::default()
            .with_threads(3)
            .unwrap()
            .with_thread_name("sim");
        assert_eq!(config.threads.get(), 3);
        assert_eq!(config.thread_name, "sim");
    }
}
