use serde::{Deserialize, Serialize};

/// What a crawl does when a story fails to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
  /// Abort the whole run on the first failure.
  #[default]
  FailFast,
  /// Render everything, persist what succeeded, report failures at the end.
  Collect,
}
