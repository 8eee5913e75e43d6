//! Storycrawl Browser
//!
//! Headless Chromium collaborators used to render Storybook stories, driven
//! over the DevTools protocol with chromiumoxide.
//!
//! - [`StorybookConnection`] checks the Storybook is reachable and owns the
//!   browser process.
//! - [`StoriesBrowser`] opens the preview iframe and lists every story.
//! - [`StoryPreviewBrowser`] is one rendering worker: it navigates to a story,
//!   waits for the page to settle ([`MetricsWatcher`]) and extracts markup.
//!   It implements [`storycrawl_pool::Worker`] so a set of them can back an
//!   `ExecutionService`.

mod connection;
mod error;
mod metrics;
mod preview;
mod script;
mod stories;
mod story;

pub use connection::StorybookConnection;
pub use error::BrowserError;
pub use metrics::{MetricsSample, MetricsWatcher, StabilityTracker};
pub use preview::StoryPreviewBrowser;
pub use stories::StoriesBrowser;
pub use story::{Story, preview_url, story_url};
