//! Browser error types.

use chromiumoxide::error::CdpError;

/// Errors raised by the browser collaborators.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
  /// The Storybook did not answer, or answered with an error status.
  #[error("storybook at {url} is not reachable: {source}")]
  Unreachable {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// Chromium could not be located, downloaded or started.
  #[error("failed to launch browser: {message}")]
  Launch { message: String },

  /// A DevTools protocol call failed.
  #[error("browser protocol error: {0}")]
  Cdp(#[from] CdpError),

  /// A page script could not be built or returned something unexpected.
  #[error("page script failed: {message}")]
  Script { message: String },

  /// A page script returned JSON of the wrong shape.
  #[error("unexpected page script result: {0}")]
  Decode(#[from] serde_json::Error),

  /// Storybook never published its story list.
  #[error("timed out after {waited_ms}ms waiting for {what}")]
  Timeout { what: &'static str, waited_ms: u64 },

  /// The story's page kept changing for the whole sampling budget.
  #[error("page never became stable after {samples} samples")]
  Unstable { samples: u32 },

  #[error("invalid storybook url: {0}")]
  Url(#[from] url::ParseError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
