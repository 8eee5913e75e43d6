mod crawl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use storycrawl_artifact::FsSink;
use storycrawl_browser::StorybookConnection;
use storycrawl_config::{CrawlConfig, FailureMode};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::crawl::{check_summary, crawl, list_stories};

/// Storycrawl - render every Storybook story to static HTML
#[derive(Parser)]
#[command(name = "storycrawl")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to a JSON crawl config
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Render every story and write its markup to disk
  Crawl {
    #[command(flatten)]
    target: TargetArgs,

    /// Directory to write `{story_id}.html` files to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of preview pages rendering in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Give up on the render phase after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep rendering after a story fails and report failures at the end
    #[arg(long)]
    keep_going: bool,
  },

  /// List the stories a Storybook exposes
  List {
    #[command(flatten)]
    target: TargetArgs,
  },
}

#[derive(Args)]
struct TargetArgs {
  /// Storybook base URL
  url: Option<String>,

  /// Chromium executable to launch instead of a downloaded one
  #[arg(long)]
  chrome: Option<PathBuf>,

  /// Show the browser window
  #[arg(long)]
  headful: bool,
}

impl TargetArgs {
  fn apply(self, config: &mut CrawlConfig) {
    if let Some(url) = self.url {
      config.storybook_url = url;
    }
    if let Some(chrome) = self.chrome {
      config.browser.executable = Some(chrome);
    }
    if self.headful {
      config.browser.headless = false;
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storycrawl=info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut config = match &cli.config {
    Some(path) => CrawlConfig::from_file(path)
      .with_context(|| format!("failed to load config: {}", path.display()))?,
    None => CrawlConfig::default(),
  };

  match cli.command {
    Some(Commands::Crawl {
      target,
      output_dir,
      workers,
      timeout_secs,
      keep_going,
    }) => {
      target.apply(&mut config);
      if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
      }
      if let Some(workers) = workers {
        config.workers = workers;
      }
      if timeout_secs.is_some() {
        config.timeout_secs = timeout_secs;
      }
      if keep_going {
        config.failure_mode = FailureMode::Collect;
      }
      config.validate().context("invalid crawl config")?;
      run_crawl(config)?;
    }
    Some(Commands::List { target }) => {
      target.apply(&mut config);
      config.validate().context("invalid crawl config")?;
      run_list(config)?;
    }
    None => {
      println!("storycrawl - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_crawl(config: CrawlConfig) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_crawl_async(config).await })
}

async fn run_crawl_async(config: CrawlConfig) -> Result<()> {
  let sink = FsSink::new(&config.output_dir);
  let cancel = CancellationToken::new();
  cancel_on_ctrl_c(cancel.clone());

  info!(
    url = %config.base_url(),
    workers = config.workers,
    output_dir = %config.output_dir.display(),
    "crawl started"
  );

  let summary = crawl(&config, &sink, cancel).await?;

  info!(
    stories = summary.stories,
    written = summary.written,
    missing_root = summary.missing_root.len(),
    failed = summary.failed.len(),
    "crawl finished"
  );
  if config.failure_mode == FailureMode::Collect {
    println!("{}", serde_json::to_string_pretty(&summary)?);
  }

  check_summary(&summary)
}

fn run_list(config: CrawlConfig) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_list_async(config).await })
}

async fn run_list_async(config: CrawlConfig) -> Result<()> {
  let connection = StorybookConnection::connect(config.base_url(), &config.browser)
    .await
    .context("failed to connect to storybook")?;

  let stories = list_stories(&connection, &config).await;

  if let Err(e) = connection.disconnect().await {
    warn!(error = %e, "failed to disconnect from storybook");
  }

  for story in stories? {
    println!("{}", story.id);
  }
  Ok(())
}

/// Cancel the run on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling crawl");
      cancel.cancel();
    }
  });
}
