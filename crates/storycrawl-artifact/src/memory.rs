use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Error, Sink, validate_key};

/// In-memory sink.
#[derive(Default)]
pub struct MemorySink {
  artifacts: RwLock<BTreeMap<String, String>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Keys currently stored, in sorted order.
  pub async fn keys(&self) -> Vec<String> {
    self.artifacts.read().await.keys().cloned().collect()
  }
}

#[async_trait]
impl Sink for MemorySink {
  async fn write(&self, key: &str, markup: &str) -> Result<(), Error> {
    validate_key(key)?;
    self
      .artifacts
      .write()
      .await
      .insert(key.to_string(), markup.to_string());
    Ok(())
  }

  async fn read(&self, key: &str) -> Result<String, Error> {
    self
      .artifacts
      .read()
      .await
      .get(key)
      .cloned()
      .ok_or_else(|| Error::NotFound(key.to_string()))
  }
}
