//! Crawl driver: connect, list, render on the worker pool, persist, tear down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use storycrawl_artifact::Sink;
use storycrawl_browser::{
  BrowserError, StoriesBrowser, Story, StoryPreviewBrowser, StorybookConnection,
};
use storycrawl_config::{CrawlConfig, FailureMode, StabilityConfig};
use storycrawl_pool::{ExecutionService, Worker};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What one preview produced for one story.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStory {
  pub story: Story,
  /// `None` when the story rendered no root element.
  pub markup: Option<String>,
}

/// Totals reported at the end of a crawl.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct CrawlSummary {
  pub stories: usize,
  pub written: usize,
  pub missing_root: Vec<String>,
  pub failed: Vec<FailedStory>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct FailedStory {
  pub story_id: String,
  pub error: String,
}

/// Navigate `worker` to `story`, wait for it to settle, and capture its markup.
#[instrument(name = "render_story", skip_all, fields(slot = worker.slot(), story_id = %story.id))]
pub async fn render_story(
  worker: &StoryPreviewBrowser,
  story: Story,
  selector: &str,
  stability: &StabilityConfig,
) -> Result<RenderedStory, BrowserError> {
  worker.set_current_story(&story).await?;
  worker.wait_for_stable(stability).await?;
  let markup = worker.root_markup(selector).await?;
  Ok(RenderedStory { story, markup })
}

/// List the stories of the Storybook behind `connection`.
pub async fn list_stories(connection: &StorybookConnection, config: &CrawlConfig) -> Result<Vec<Story>> {
  let browser = StoriesBrowser::boot(connection)
    .await
    .context("failed to boot stories browser")?;

  let stories = browser
    .get_stories(Duration::from_secs(config.stories_timeout_secs))
    .await
    .context("failed to list stories");

  if let Err(e) = browser.close().await {
    warn!(error = %e, "failed to close stories browser");
  }
  stories
}

/// Run a full crawl. The browser is disconnected on every exit path.
pub async fn crawl(config: &CrawlConfig, sink: &dyn Sink, cancel: CancellationToken) -> Result<CrawlSummary> {
  let connection = StorybookConnection::connect(config.base_url(), &config.browser)
    .await
    .context("failed to connect to storybook")?;
  info!(url = %connection.url(), "connected");

  let result = crawl_connected(&connection, config, sink, cancel).await;

  if let Err(e) = connection.disconnect().await {
    warn!(error = %e, "failed to disconnect from storybook");
  }
  result
}

async fn crawl_connected(
  connection: &StorybookConnection,
  config: &CrawlConfig,
  sink: &dyn Sink,
  cancel: CancellationToken,
) -> Result<CrawlSummary> {
  let stories: Arc<[Story]> = list_stories(connection, config).await?.into();
  info!(count = stories.len(), "found stories");

  let service = ExecutionService::boot(config.workers, |slot| StoryPreviewBrowser::boot(connection, slot))
    .await
    .context("failed to boot preview workers")?;

  let rendered = render_all(&service, Arc::clone(&stories), config, cancel).await;

  if let Err(e) = service.shutdown().await {
    warn!(error = %e, "failed to close preview workers");
  }

  let (rendered, failed) = rendered?;
  let mut summary = CrawlSummary {
    stories: stories.len(),
    failed,
    ..Default::default()
  };
  persist(sink, &rendered, &config.root_selector, &mut summary).await?;

  for failure in &summary.failed {
    error!(story_id = %failure.story_id, error = %failure.error, "story failed");
  }
  Ok(summary)
}

/// Render every story on the pool according to the configured failure mode.
///
/// Returns the successful renders in story order plus the stories that failed
/// (always empty under fail-fast).
async fn render_all(
  service: &ExecutionService<StoryPreviewBrowser>,
  stories: Arc<[Story]>,
  config: &CrawlConfig,
  cancel: CancellationToken,
) -> Result<(Vec<RenderedStory>, Vec<FailedStory>)> {
  let selector: Arc<str> = Arc::from(config.root_selector.as_str());
  let stability = Arc::new(config.stability.clone());
  let apply = move |story: &Story| {
    let story = story.clone();
    let selector = Arc::clone(&selector);
    let stability = Arc::clone(&stability);
    move |worker: Arc<StoryPreviewBrowser>| async move {
      render_story(&worker, story, &selector, &stability).await
    }
  };

  let render = async {
    match config.failure_mode {
      FailureMode::FailFast => {
        let rendered = service
          .execute(Arc::clone(&stories), apply, cancel)
          .await
          .context("rendering failed")?;
        Ok((rendered, Vec::new()))
      }
      FailureMode::Collect => {
        let outcomes = service
          .execute_collect(Arc::clone(&stories), apply, cancel)
          .await
          .context("rendering failed")?;
        Ok(split_outcomes(&stories, outcomes))
      }
    }
  };

  match config.timeout_secs {
    Some(secs) => tokio::time::timeout(Duration::from_secs(secs), render)
      .await
      .with_context(|| format!("rendering did not finish within {}s", secs))?,
    None => render.await,
  }
}

/// Pair collected outcomes with their stories.
fn split_outcomes(
  stories: &[Story],
  outcomes: Vec<Result<RenderedStory, BrowserError>>,
) -> (Vec<RenderedStory>, Vec<FailedStory>) {
  let mut rendered = Vec::with_capacity(outcomes.len());
  let mut failed = Vec::new();
  for (story, outcome) in stories.iter().zip(outcomes) {
    match outcome {
      Ok(r) => rendered.push(r),
      Err(e) => failed.push(FailedStory {
        story_id: story.id.clone(),
        error: e.to_string(),
      }),
    }
  }
  (rendered, failed)
}

/// Write every rendered story that produced markup.
async fn persist(
  sink: &dyn Sink,
  rendered: &[RenderedStory],
  selector: &str,
  summary: &mut CrawlSummary,
) -> Result<()> {
  for r in rendered {
    match &r.markup {
      Some(markup) => {
        sink
          .write(&r.story.id, markup)
          .await
          .with_context(|| format!("failed to write markup for story '{}'", r.story.id))?;
        info!(story_id = %r.story.id, bytes = markup.len(), "story written");
        debug!(story_id = %r.story.id, markup = %markup, "rendered markup");
        summary.written += 1;
      }
      None => {
        warn!(story_id = %r.story.id, selector, "root element not found, skipping");
        summary.missing_root.push(r.story.id.clone());
      }
    }
  }
  Ok(())
}

/// Turn a finished summary into the process result.
pub fn check_summary(summary: &CrawlSummary) -> Result<()> {
  if !summary.failed.is_empty() {
    bail!(
      "{} of {} stories failed to render",
      summary.failed.len(),
      summary.stories
    );
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use storycrawl_artifact::MemorySink;

  fn story(id: &str) -> Story {
    Story {
      id: id.to_string(),
      kind: "Button".to_string(),
      name: id.to_string(),
    }
  }

  fn rendered(id: &str, markup: Option<&str>) -> RenderedStory {
    RenderedStory {
      story: story(id),
      markup: markup.map(str::to_string),
    }
  }

  #[tokio::test]
  async fn test_persist_writes_only_stories_with_markup() {
    let sink = MemorySink::new();
    let mut summary = CrawlSummary::default();

    persist(
      &sink,
      &[
        rendered("button--primary", Some("<html>primary</html>")),
        rendered("button--empty", None),
        rendered("button--secondary", Some("<html>secondary</html>")),
      ],
      "#root",
      &mut summary,
    )
    .await
    .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.missing_root, vec!["button--empty"]);
    assert_eq!(sink.keys().await, vec!["button--primary", "button--secondary"]);
    assert_eq!(
      sink.read("button--primary").await.unwrap(),
      "<html>primary</html>"
    );
  }

  #[tokio::test]
  async fn test_persist_reports_write_failures() {
    let sink = MemorySink::new();
    let mut summary = CrawlSummary::default();

    let err = persist(
      &sink,
      &[rendered("../escape", Some("<html></html>"))],
      "#root",
      &mut summary,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("../escape"));
    assert_eq!(summary.written, 0);
  }

  #[test]
  fn test_split_outcomes_pairs_failures_with_stories() {
    let stories = vec![story("a"), story("b"), story("c")];
    let outcomes = vec![
      Ok(rendered("a", Some("<a/>"))),
      Err(BrowserError::Unstable { samples: 10 }),
      Ok(rendered("c", None)),
    ];

    let (ok, failed) = split_outcomes(&stories, outcomes);

    assert_eq!(ok, vec![rendered("a", Some("<a/>")), rendered("c", None)]);
    assert_eq!(
      failed,
      vec![FailedStory {
        story_id: "b".to_string(),
        error: "page never became stable after 10 samples".to_string(),
      }]
    );
  }

  #[test]
  fn test_check_summary() {
    let mut summary = CrawlSummary {
      stories: 3,
      written: 2,
      ..Default::default()
    };
    assert!(check_summary(&summary).is_ok());

    summary.failed.push(FailedStory {
      story_id: "b".to_string(),
      error: "boom".to_string(),
    });
    let err = check_summary(&summary).unwrap_err();
    assert_eq!(err.to_string(), "1 of 3 stories failed to render");
  }
}
