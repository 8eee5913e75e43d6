//! Storycrawl Config
//!
//! This crate contains the serializable configuration for a crawl run.
//! Every field has a default, so an empty JSON object is a valid config.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--config=crawl.json`)
//! - Command-line flags, which override the file

mod crawl;
mod enums;
mod error;

pub use crawl::{BrowserConfig, CrawlConfig, StabilityConfig};
pub use enums::FailureMode;
pub use error::ConfigError;
