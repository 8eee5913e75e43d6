//! Preview workers.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use storycrawl_config::StabilityConfig;
use storycrawl_pool::Worker;
use tracing::{debug, instrument};

use crate::connection::StorybookConnection;
use crate::error::BrowserError;
use crate::metrics::MetricsWatcher;
use crate::script::{evaluate, root_markup_script};
use crate::story::{Story, preview_url, story_url};

/// One rendering worker: a dedicated browser page showing one story at a time.
pub struct StoryPreviewBrowser {
  slot: usize,
  base_url: String,
  page: Page,
}

impl StoryPreviewBrowser {
  /// Open a preview page for worker `slot`.
  #[instrument(name = "preview_boot", skip(connection))]
  pub async fn boot(connection: &StorybookConnection, slot: usize) -> Result<Self, BrowserError> {
    let url = preview_url(connection.url())?;
    let page = connection.browser().new_page(url.as_str()).await?;
    debug!(slot, "preview booted");

    Ok(Self {
      slot,
      base_url: connection.url().to_string(),
      page,
    })
  }

  /// Navigate the page to `story` and wait for the load to finish.
  pub async fn set_current_story(&self, story: &Story) -> Result<(), BrowserError> {
    let url = story_url(&self.base_url, &story.id)?;
    self.page.goto(url.as_str()).await?;
    debug!(slot = self.slot, story_id = %story.id, "story loaded");
    Ok(())
  }

  /// Wait until the current story has stopped re-rendering.
  pub async fn wait_for_stable(&self, config: &StabilityConfig) -> Result<(), BrowserError> {
    MetricsWatcher::new(&self.page).wait_for_stable(config).await
  }

  /// Markup of the element matching `selector` as a full HTML document, or
  /// `None` if the story rendered no such element.
  pub async fn root_markup(&self, selector: &str) -> Result<Option<String>, BrowserError> {
    evaluate(&self.page, &root_markup_script(selector)?).await
  }

  pub fn page(&self) -> &Page {
    &self.page
  }
}

#[async_trait]
impl Worker for StoryPreviewBrowser {
  type Error = BrowserError;

  fn slot(&self) -> usize {
    self.slot
  }

  async fn close(&self) -> Result<(), BrowserError> {
    self.page.clone().close().await?;
    debug!(slot = self.slot, "preview closed");
    Ok(())
  }
}
