use thiserror::Error;

/// Errors that can occur within the `cc_pool` pool.
///
/// Misuse of the pool lifecycle (submitting after [`wait`](crate::BoundedPool::wait),
/// waiting twice) is reported through these variants rather than left undefined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool has been signalled that no more units will be submitted")]
  PoolClosed,

  #[error("Completion-and-close was already requested for this pool")]
  AlreadyWaiting,

  #[error("Pool's permit semaphore was closed while waiting for admission")]
  SemaphoreClosed,

  #[error("Submitted unit panicked")]
  TaskPanicked,

  #[error("Blocking unit was cancelled before it could finish (runtime shutting down)")]
  TaskCancelled,
}
