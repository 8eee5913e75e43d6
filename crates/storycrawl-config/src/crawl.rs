use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::enums::FailureMode;
use crate::error::ConfigError;

pub const DEFAULT_STORYBOOK_URL: &str = "https://storybookjs.netlify.app/vue-kitchen-sink";

/// Settings for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
  /// Base URL of the Storybook to crawl.
  pub storybook_url: String,
  /// Directory rendered markup is written to, one `{story_id}.html` per story.
  pub output_dir: PathBuf,
  /// Number of preview workers (browser pages) rendering in parallel.
  pub workers: usize,
  /// CSS selector of the element whose markup is captured.
  pub root_selector: String,
  /// Upper bound on the whole render phase.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
  /// How long to wait for Storybook to publish its story list.
  pub stories_timeout_secs: u64,
  pub failure_mode: FailureMode,
  pub browser: BrowserConfig,
  pub stability: StabilityConfig,
}

impl Default for CrawlConfig {
  fn default() -> Self {
    Self {
      storybook_url: DEFAULT_STORYBOOK_URL.to_string(),
      output_dir: PathBuf::from("rendered"),
      workers: 4,
      root_selector: "#root".to_string(),
      timeout_secs: None,
      stories_timeout_secs: 30,
      failure_mode: FailureMode::FailFast,
      browser: BrowserConfig::default(),
      stability: StabilityConfig::default(),
    }
  }
}

impl CrawlConfig {
  /// Load a config from a JSON file. Missing fields take their defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Check the values that would make a run impossible.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.storybook_url.trim().is_empty() {
      return Err(invalid("storybook_url must not be empty"));
    }
    if self.workers == 0 {
      return Err(invalid("workers must be at least 1"));
    }
    if self.root_selector.trim().is_empty() {
      return Err(invalid("root_selector must not be empty"));
    }
    if self.stability.stable_samples == 0 {
      return Err(invalid("stability.stable_samples must be at least 1"));
    }
    if self.stability.max_samples < self.stability.stable_samples {
      return Err(invalid(
        "stability.max_samples must not be less than stability.stable_samples",
      ));
    }
    Ok(())
  }

  /// Base URL with any trailing slash removed.
  pub fn base_url(&self) -> &str {
    self.storybook_url.trim_end_matches('/')
  }
}

fn invalid(message: &str) -> ConfigError {
  ConfigError::Invalid {
    message: message.to_string(),
  }
}

/// Headless browser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
  /// Chromium executable to launch. When unset, one is downloaded into the
  /// user cache directory.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub executable: Option<PathBuf>,
  pub headless: bool,
  pub launch_timeout_secs: u64,
}

impl Default for BrowserConfig {
  fn default() -> Self {
    Self {
      executable: None,
      headless: true,
      launch_timeout_secs: 30,
    }
  }
}

/// How a preview decides its story has finished rendering.
///
/// The page's layout metrics are sampled every `interval_ms`; the story is
/// stable once `stable_samples` consecutive samples are identical. After
/// `max_samples` samples without that happening the wait fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
  pub interval_ms: u64,
  pub stable_samples: u32,
  pub max_samples: u32,
}

impl Default for StabilityConfig {
  fn default() -> Self {
    Self {
      interval_ms: 50,
      stable_samples: 3,
      max_samples: 1000,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_object_uses_defaults() {
    let config: CrawlConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, CrawlConfig::default());
    assert_eq!(config.workers, 4);
    assert_eq!(config.root_selector, "#root");
    assert!(config.browser.headless);
  }

  #[test]
  fn test_partial_config() {
    let config: CrawlConfig = serde_json::from_str(
      r#"{
        "storybook_url": "http://localhost:6006/",
        "workers": 2,
        "failure_mode": "collect",
        "stability": { "interval_ms": 100 }
      }"#,
    )
    .unwrap();

    assert_eq!(config.base_url(), "http://localhost:6006");
    assert_eq!(config.workers, 2);
    assert_eq!(config.failure_mode, FailureMode::Collect);
    assert_eq!(config.stability.interval_ms, 100);
    assert_eq!(config.stability.stable_samples, 3);
  }

  #[test]
  fn test_validate_rejects_zero_workers() {
    let config = CrawlConfig {
      workers: 0,
      ..Default::default()
    };
    let err = config.validate().unwrap_err();
    assert_eq!(err.to_string(), "invalid config: workers must be at least 1");
  }

  #[test]
  fn test_validate_rejects_impossible_stability() {
    let mut config = CrawlConfig::default();
    config.stability.max_samples = 2;
    assert!(config.validate().is_err());

    config.stability = StabilityConfig {
      stable_samples: 0,
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_default_config_is_valid() {
    assert!(CrawlConfig::default().validate().is_ok());
  }

  #[test]
  fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawl.json");
    std::fs::write(&path, r#"{ "output_dir": "out", "timeout_secs": 120 }"#).unwrap();

    let config = CrawlConfig::from_file(&path).unwrap();
    assert_eq!(config.output_dir, PathBuf::from("out"));
    assert_eq!(config.timeout_secs, Some(120));
  }

  #[test]
  fn test_from_file_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawl.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = CrawlConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }
}
