//! Error types for pool execution.

use thiserror::Error;

/// Errors that can occur while executing a batch of tasks.
///
/// `E` is the error type produced by the caller's jobs. It is carried through
/// unchanged so the caller can decide whether to retry, skip, or abort.
#[derive(Debug, Error)]
pub enum ExecutionError<E> {
  /// A job failed for the task at `index` while running on worker `slot`.
  #[error("task {index} failed on worker {slot}: {source}")]
  Task {
    index: usize,
    slot: usize,
    #[source]
    source: E,
  },

  /// Tasks were submitted to a pool with no workers.
  #[error("worker pool is empty but {tasks} task(s) were submitted")]
  EmptyPool { tasks: usize },

  /// The caller cancelled the execution.
  #[error("execution cancelled")]
  Cancelled,

  /// A lane's runtime task panicked or was aborted.
  #[error("lane for worker {slot} stopped abnormally: {message}")]
  LanePanicked { slot: usize, message: String },

  /// A task index finished the run without a recorded outcome.
  #[error("no outcome recorded for task {index}")]
  MissingOutcome { index: usize },
}

impl<E> ExecutionError<E> {
  /// Index of the task that caused the failure, if the failure belongs to one.
  pub fn task_index(&self) -> Option<usize> {
    match self {
      ExecutionError::Task { index, .. } | ExecutionError::MissingOutcome { index } => Some(*index),
      _ => None,
    }
  }
}
