//! Story references and preview URLs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// A single story exposed by the Storybook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Story {
  /// Story id, e.g. `button--primary`. Unique within a Storybook.
  pub id: String,
  /// Component title the story belongs to, e.g. `Button`.
  pub kind: String,
  /// Story name, e.g. `Primary`.
  pub name: String,
}

/// Story entry as reported by the page, before filtering.
#[derive(Debug, Deserialize)]
pub(crate) struct RawStory {
  id: String,
  #[serde(default)]
  kind: String,
  #[serde(default)]
  name: String,
  #[serde(default, rename = "docsOnly")]
  docs_only: bool,
}

/// Turn the raw listing into stories: docs-only entries are dropped and
/// duplicate ids keep their first occurrence.
pub(crate) fn collect_stories(raw: Vec<RawStory>) -> Vec<Story> {
  let mut seen = HashSet::new();
  raw
    .into_iter()
    .filter(|s| !s.docs_only)
    .filter(|s| seen.insert(s.id.clone()))
    .map(|s| Story {
      id: s.id,
      kind: s.kind,
      name: s.name,
    })
    .collect()
}

/// URL of the bare preview iframe.
pub fn preview_url(base_url: &str) -> Result<Url, url::ParseError> {
  iframe_url(base_url)
}

/// URL of the preview iframe rendering a single story.
pub fn story_url(base_url: &str, story_id: &str) -> Result<Url, url::ParseError> {
  let mut url = iframe_url(base_url)?;
  url
    .query_pairs_mut()
    .append_pair("id", story_id)
    .append_pair("viewMode", "story");
  Ok(url)
}

/// Preview URL pointing at a story that does not exist, so Storybook boots
/// its client API without spending time rendering anything.
pub(crate) fn listing_url(base_url: &str) -> Result<Url, url::ParseError> {
  let mut url = iframe_url(base_url)?;
  url
    .query_pairs_mut()
    .append_pair("selectedKind", "storycrawl-kind")
    .append_pair("selectedStory", "storycrawl-story")
    .append_pair("viewMode", "story");
  Ok(url)
}

fn iframe_url(base_url: &str) -> Result<Url, url::ParseError> {
  // Url::join replaces the last path segment unless the base ends in '/'.
  let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
  base.join("iframe.html")
}
