//! Render stability detection from DevTools performance metrics.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::performance::{EnableParams, GetMetricsParams};
use chromiumoxide::page::Page;
use storycrawl_config::StabilityConfig;
use tracing::debug;

use crate::error::BrowserError;

/// The layout-related metrics that must stop changing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSample {
  pub nodes: f64,
  pub recalc_style_count: f64,
  pub layout_count: f64,
}

impl MetricsSample {
  /// Pick the watched metrics out of a `(name, value)` list. Missing metrics
  /// read as zero.
  pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
    let mut sample = Self::default();
    for (name, value) in metrics {
      match name {
        "Nodes" => sample.nodes = value,
        "RecalcStyleCount" => sample.recalc_style_count = value,
        "LayoutCount" => sample.layout_count = value,
        _ => {}
      }
    }
    sample
  }
}

/// Counts how many consecutive samples have been identical.
#[derive(Debug)]
pub struct StabilityTracker {
  required: u32,
  previous: Option<MetricsSample>,
  run: u32,
}

impl StabilityTracker {
  /// `required` is the number of identical consecutive samples that count
  /// as stable.
  pub fn new(required: u32) -> Self {
    Self {
      required,
      previous: None,
      run: 0,
    }
  }

  /// Record a sample; returns true once the page is stable.
  pub fn observe(&mut self, sample: MetricsSample) -> bool {
    self.run = match self.previous {
      Some(previous) if previous == sample => self.run + 1,
      _ => 1,
    };
    self.previous = Some(sample);
    self.run >= self.required
  }
}

/// Waits for a page to stop re-rendering.
pub struct MetricsWatcher<'a> {
  page: &'a Page,
}

impl<'a> MetricsWatcher<'a> {
  pub fn new(page: &'a Page) -> Self {
    Self { page }
  }

  /// Sample the page's metrics until they settle, or fail with
  /// [`BrowserError::Unstable`] once `max_samples` is spent.
  pub async fn wait_for_stable(&self, config: &StabilityConfig) -> Result<(), BrowserError> {
    self.page.execute(EnableParams::default()).await?;

    let interval = Duration::from_millis(config.interval_ms);
    let mut tracker = StabilityTracker::new(config.stable_samples);

    for taken in 1..=config.max_samples {
      let response = self.page.execute(GetMetricsParams::default()).await?;
      let sample = MetricsSample::from_metrics(
        response
          .result
          .metrics
          .iter()
          .map(|m| (m.name.as_str(), m.value)),
      );

      if tracker.observe(sample) {
        debug!(samples = taken, nodes = sample.nodes, "page stable");
        return Ok(());
      }
      tokio::time::sleep(interval).await;
    }

    Err(BrowserError::Unstable {
      samples: config.max_samples,
    })
  }
}
