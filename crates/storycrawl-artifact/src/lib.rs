//! Storycrawl Artifact
//!
//! This crate provides the persistence sink for rendered story markup.
//! Each story's markup is stored under its story id; what that means on
//! disk (or in memory) is up to the [`Sink`] implementation.
//!
//! - [`FsSink`] writes one `{id}.html` file per story into an output directory.
//! - [`MemorySink`] keeps everything in a map, for tests and dry runs.

mod fs;
mod memory;

pub use fs::FsSink;
pub use memory::MemorySink;

use async_trait::async_trait;

/// Error type for sink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The key cannot be stored safely (empty, or would escape the sink).
  #[error("invalid artifact key: {0:?}")]
  InvalidKey(String),

  /// The requested artifact was not found.
  #[error("artifact not found: {0}")]
  NotFound(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Persistence sink for rendered markup.
///
/// Write failures are always returned to the caller.
#[async_trait]
pub trait Sink: Send + Sync {
  /// Durably store `markup` under `key`, replacing any previous value.
  async fn write(&self, key: &str, markup: &str) -> Result<(), Error>;

  /// Read back the markup stored under `key`.
  async fn read(&self, key: &str) -> Result<String, Error>;
}

/// Reject keys that are empty or could address something outside the sink.
pub(crate) fn validate_key(key: &str) -> Result<(), Error> {
  let escapes = key == "." || key == ".." || key.contains(['/', '\\', '\0']);
  if key.is_empty() || escapes {
    return Err(Error::InvalidKey(key.to_string()));
  }
  Ok(())
}
