//! Story listing.

use std::time::{Duration, Instant};

use chromiumoxide::page::Page;
use tracing::{debug, info, instrument};

use crate::connection::StorybookConnection;
use crate::error::BrowserError;
use crate::script::{STORIES_SCRIPT, evaluate};
use crate::story::{RawStory, Story, collect_stories, listing_url};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A browser page used only to ask Storybook for its stories.
pub struct StoriesBrowser {
  page: Page,
}

impl StoriesBrowser {
  /// Open the preview iframe without selecting a real story.
  pub async fn boot(connection: &StorybookConnection) -> Result<Self, BrowserError> {
    let url = listing_url(connection.url())?;
    let page = connection.browser().new_page(url.as_str()).await?;
    debug!(url = %url, "stories browser booted");
    Ok(Self { page })
  }

  /// List every story, waiting up to `timeout` for Storybook to load them.
  #[instrument(name = "get_stories", skip(self))]
  pub async fn get_stories(&self, timeout: Duration) -> Result<Vec<Story>, BrowserError> {
    let started = Instant::now();

    loop {
      let listed: Option<Vec<RawStory>> = evaluate(&self.page, STORIES_SCRIPT).await?;
      if let Some(raw) = listed {
        let stories = collect_stories(raw);
        info!(count = stories.len(), "found stories");
        return Ok(stories);
      }

      if started.elapsed() >= timeout {
        return Err(BrowserError::Timeout {
          what: "story list",
          waited_ms: started.elapsed().as_millis() as u64,
        });
      }
      tokio::time::sleep(POLL_INTERVAL).await;
    }
  }

  pub async fn close(self) -> Result<(), BrowserError> {
    self.page.close().await?;
    Ok(())
  }
}
