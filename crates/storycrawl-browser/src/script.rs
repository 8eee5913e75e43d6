//! Page scripts and their evaluation.
//!
//! Every script is wrapped so the page returns `JSON.stringify` of its
//! (awaited) result. That keeps `null`/`undefined` results representable and
//! lets serde decode the value on our side.

use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;

use crate::error::BrowserError;

/// Lists stories from whichever Storybook client API the preview exposes.
/// Evaluates to `null` until the API is ready.
pub(crate) const STORIES_SCRIPT: &str = r#"(async () => {
  const describe = (s) => ({
    id: s.id,
    kind: s.title || s.kind || "",
    name: s.name || s.story || "",
    docsOnly: Boolean(s.parameters && s.parameters.docsOnly),
  });

  const preview = window.__STORYBOOK_PREVIEW__;
  if (preview && preview.storyStore && typeof preview.storyStore.extract === "function") {
    if (typeof preview.storyStore.cacheAllCSFFiles === "function") {
      await preview.storyStore.cacheAllCSFFiles();
    }
    return Object.values(preview.storyStore.extract()).map(describe);
  }

  const store = window.__STORYBOOK_STORY_STORE__;
  if (store && typeof store.raw === "function" && store.raw().length > 0) {
    return store.raw().map(describe);
  }

  const api = window.__STORYBOOK_CLIENT_API__;
  if (api && typeof api.raw === "function" && api.raw().length > 0) {
    return api.raw().map(describe);
  }

  return null;
})()"#;

/// Script returning the element matching `selector`, serialized as a full
/// HTML document by the page's own parser, or `null` if nothing matches.
pub(crate) fn root_markup_script(selector: &str) -> Result<String, BrowserError> {
  let selector = serde_json::to_string(selector)?;
  Ok(format!(
    r#"(() => {{
  const root = document.querySelector({selector});
  if (!root) {{
    return null;
  }}
  const parsed = new DOMParser().parseFromString(root.outerHTML, "text/html");
  return parsed.documentElement.outerHTML;
}})()"#
  ))
}

fn wrap(script: &str) -> String {
  format!("(async () => JSON.stringify(await ({})))()", script)
}

/// Evaluate `script` in the page and decode its result.
pub(crate) async fn evaluate<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T, BrowserError> {
  let params = EvaluateParams::builder()
    .expression(wrap(script))
    .await_promise(true)
    .return_by_value(true)
    .build()
    .map_err(|message| BrowserError::Script { message })?;

  let result = page.evaluate_expression(params).await?;
  let json = match result.value() {
    Some(serde_json::Value::String(json)) => json.as_str(),
    // JSON.stringify(undefined) is undefined; treat it like null.
    _ => "null",
  };
  Ok(serde_json::from_str(json)?)
}
