//! Mapping of visited URLs back to site content.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A piece of site content a URL can resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
  pub id: u64,
  pub url: String,
  #[serde(default = "default_post_type")]
  pub post_type: String,
  pub title: String,
  /// Link target in the rendered list (defaults to `url`)
  pub permalink: Option<String>,
}

fn default_post_type() -> String {
  "post".to_string()
}

impl ContentItem {
  pub fn permalink(&self) -> &str {
    self.permalink.as_deref().unwrap_or(&self.url)
  }
}

/// Resolves a URL reported by the stats API to a content item.
pub trait ContentResolver: Send + Sync {
  fn resolve(&self, url: &str) -> Option<ContentItem>;
}

/// Resolver over a fixed list of items, matched by URL path.
///
/// Scheme, host and a trailing slash are ignored, so `http://example.com/about/`
/// and `/about` resolve to the same item.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
  by_path: HashMap<String, ContentItem>,
}

impl StaticResolver {
  pub fn new(items: impl IntoIterator<Item = ContentItem>) -> Self {
    let by_path = items
      .into_iter()
      .map(|item| (normalize_path(&item.url), item))
      .collect();

    Self { by_path }
  }

  pub fn len(&self) -> usize {
    self.by_path.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_path.is_empty()
  }
}

impl ContentResolver for StaticResolver {
  fn resolve(&self, url: &str) -> Option<ContentItem> {
    self.by_path.get(&normalize_path(url)).cloned()
  }
}

/// Reduce a URL to its path (and query), without trailing slash.
fn normalize_path(url: &str) -> String {
  let path = match Url::parse(url) {
    Ok(parsed) => match parsed.query() {
      Some(query) => format!("{}?{}", parsed.path(), query),
      None => parsed.path().to_string(),
    },
    // Relative URLs come through as-is
    Err(_) => url.trim().to_string(),
  };

  let path = if path.starts_with('/') {
    path
  } else {
    format!("/{}", path)
  };

  match path.trim_end_matches('/') {
    "" => "/".to_string(),
    trimmed => trimmed.to_string(),
  }
}
