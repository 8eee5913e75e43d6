use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Error, Sink, validate_key};

/// Filesystem-based sink.
///
/// Stores each artifact at `{base_path}/{key}.html`. The base directory is
/// created on first write.
pub struct FsSink {
  base_path: PathBuf,
}

impl FsSink {
  /// Create a new filesystem sink rooted at the given directory.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// Directory the sink writes into.
  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Path an artifact with the given key is written to.
  pub fn key_to_path(&self, key: &str) -> Result<PathBuf, Error> {
    validate_key(key)?;
    Ok(self.base_path.join(format!("{}.html", key)))
  }
}

#[async_trait]
impl Sink for FsSink {
  async fn write(&self, key: &str, markup: &str) -> Result<(), Error> {
    let path = self.key_to_path(key)?;

    fs::create_dir_all(&self.base_path).await?;

    let mut file = File::create(&path).await?;
    file.write_all(markup.as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await?;

    debug!(key, path = %path.display(), bytes = markup.len(), "artifact written");
    Ok(())
  }

  async fn read(&self, key: &str) -> Result<String, Error> {
    let path = self.key_to_path(key)?;
    fs::read_to_string(&path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(key.to_string())
      } else {
        Error::Io(e)
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_write_creates_directory_and_file() {
    let temp = tempfile::tempdir().unwrap();
    let sink = FsSink::new(temp.path().join("rendered"));

    sink
      .write("button--primary", "<html><body><div id=\"root\"></div></body></html>")
      .await
      .unwrap();

    let on_disk = std::fs::read_to_string(temp.path().join("rendered/button--primary.html")).unwrap();
    assert_eq!(on_disk, "<html><body><div id=\"root\"></div></body></html>");
  }

  #[tokio::test]
  async fn test_write_replaces_existing_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let sink = FsSink::new(temp.path());

    sink.write("story", "first").await.unwrap();
    sink.write("story", "second").await.unwrap();

    assert_eq!(sink.read("story").await.unwrap(), "second");
  }

  #[tokio::test]
  async fn test_read_missing_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let sink = FsSink::new(temp.path());

    let err = sink.read("missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(key) if key == "missing"));
  }

  #[tokio::test]
  async fn test_write_rejects_path_traversal() {
    let temp = tempfile::tempdir().unwrap();
    let sink = FsSink::new(temp.path().join("out"));

    let err = sink.write("../escape", "x").await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
    assert!(!temp.path().join("escape.html").exists());
  }

  #[tokio::test]
  async fn test_write_failure_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    // A regular file where the output directory should be.
    let blocker = temp.path().join("rendered");
    std::fs::write(&blocker, "not a directory").unwrap();
    let sink = FsSink::new(&blocker);

    let err = sink.write("story", "<html></html>").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
  }
}
