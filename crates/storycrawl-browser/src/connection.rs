//! Storybook connection: reachability check plus the browser process.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use storycrawl_config::BrowserConfig;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::BrowserError;

/// A live connection to a Storybook: the base URL plus a running browser.
///
/// Must be released with [`disconnect`](Self::disconnect).
pub struct StorybookConnection {
  url: String,
  browser: Browser,
  handler: JoinHandle<()>,
}

impl StorybookConnection {
  /// Check that `url` serves a Storybook and launch the browser.
  #[instrument(name = "storybook_connect", skip(config))]
  pub async fn connect(url: &str, config: &BrowserConfig) -> Result<Self, BrowserError> {
    let url = url.trim_end_matches('/').to_string();
    check_reachable(&url).await?;

    let executable = match &config.executable {
      Some(path) => path.clone(),
      None => fetch_chromium().await?,
    };

    let mut builder = LaunchConfig::builder()
      .chrome_executable(executable)
      .launch_timeout(Duration::from_secs(config.launch_timeout_secs))
      .arg("--disable-gpu")
      .arg("--no-sandbox");
    if !config.headless {
      builder = builder.with_head();
    }
    let launch_config = builder
      .build()
      .map_err(|message| BrowserError::Launch { message })?;

    let (browser, mut handler) = Browser::launch(launch_config).await?;
    let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

    info!(url = %url, "connected to storybook");

    Ok(Self {
      url,
      browser,
      handler,
    })
  }

  /// Base URL of the Storybook, without a trailing slash.
  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn browser(&self) -> &Browser {
    &self.browser
  }

  /// Close the browser and stop its event handler.
  pub async fn disconnect(mut self) -> Result<(), BrowserError> {
    let closed = self.browser.close().await;
    if let Err(e) = self.browser.wait().await {
      warn!(error = %e, "browser process did not exit cleanly");
    }
    self.handler.abort();
    closed?;

    info!(url = %self.url, "disconnected from storybook");
    Ok(())
  }
}

async fn check_reachable(url: &str) -> Result<(), BrowserError> {
  reqwest::get(url)
    .await
    .and_then(|response| response.error_for_status())
    .map_err(|source| BrowserError::Unreachable {
      url: url.to_string(),
      source,
    })?;
  Ok(())
}

/// Download Chromium into the user cache directory (reused across runs).
async fn fetch_chromium() -> Result<PathBuf, BrowserError> {
  let download_path = dirs::cache_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("storycrawl")
    .join("chromium");
  tokio::fs::create_dir_all(&download_path).await?;

  let options = BrowserFetcherOptions::builder()
    .with_path(&download_path)
    .build()
    .map_err(|e| BrowserError::Launch {
      message: e.to_string(),
    })?;

  let installation = BrowserFetcher::new(options)
    .fetch()
    .await
    .map_err(|e| BrowserError::Launch {
      message: format!("failed to download chromium: {}", e),
    })?;

  info!(path = %installation.executable_path.display(), "using downloaded chromium");
  Ok(installation.executable_path)
}
