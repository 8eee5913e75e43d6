//! Worker contract.

use async_trait::async_trait;

/// One unit of execution capacity in the pool.
///
/// A worker wraps whatever resource does the actual work (a browser page, a
/// connection, ...). The [`ExecutionService`](crate::ExecutionService) binds
/// each worker to exactly one lane, so a worker never runs two jobs at once and
/// needs no locking around its own state.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
  /// Error returned when the worker fails to boot or close.
  type Error: std::error::Error + Send + Sync + 'static;

  /// Slot index of this worker in `[0, N)`.
  fn slot(&self) -> usize;

  /// Release the underlying resource.
  async fn close(&self) -> Result<(), Self::Error>;
}
