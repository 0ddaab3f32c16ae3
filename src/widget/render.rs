//! Rendering of the popular posts list, with a 24 hour output cache.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{OptionStore, TransientStore};
use crate::clicky::api_types::top_urls;
use crate::clicky::{ClickyClient, Credentials, Fetch, Payload, QueryArgs};

use super::content::{ContentItem, ContentResolver};
use super::html::{esc_attr, esc_html, strip_tags};
use super::instance::{WidgetForm, WidgetInstance};

/// Report the widget is built from.
const PAGES_REPORT: &str = "pages";

/// Extra rows requested so filtering out non-matching URLs still leaves enough.
const EXTRA_RESULTS: u32 = 20;

/// Lifetime of a cached render.
const OUTPUT_CACHE_HOURS: i64 = 24;

/// Option holding saved settings of every widget, keyed by widget id.
pub const INSTANCES_OPTION: &str = "widget_clicky-popular-posts";

/// Markup wrapped around the widget by the surrounding theme.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WidgetChrome {
  pub before_widget: String,
  pub after_widget: String,
  pub before_title: String,
  pub after_title: String,
}

impl Default for WidgetChrome {
  fn default() -> Self {
    Self {
      before_widget: r#"<div class="widget clicky-popular-posts-widget">"#.to_string(),
      after_widget: "</div>".to_string(),
      before_title: r#"<h2 class="widget-title">"#.to_string(),
      after_title: "</h2>".to_string(),
    }
  }
}

/// Popular posts widget.
///
/// Each render builds a request-scoped [`ClickyClient`] over the shared option
/// store, so report caching behaves exactly as for any other client.
pub struct PopularPostsWidget<F, O, T, R> {
  fetcher: F,
  options: O,
  transients: T,
  resolver: R,
  endpoint: Option<Url>,
  secure: bool,
  diagnostics: bool,
}

impl<F, O, T, R> PopularPostsWidget<F, O, T, R>
where
  F: Fetch + Clone,
  O: OptionStore + Clone,
  T: TransientStore,
  R: ContentResolver,
{
  pub fn new(fetcher: F, options: O, transients: T, resolver: R) -> Self {
    Self {
      fetcher,
      options,
      transients,
      resolver,
      endpoint: None,
      secure: false,
      diagnostics: false,
    }
  }

  pub fn with_endpoint(mut self, endpoint: Url) -> Self {
    self.endpoint = Some(endpoint);
    self
  }

  pub fn with_secure(mut self, secure: bool) -> Self {
    self.secure = secure;
    self
  }

  /// Emit an HTML comment describing failures instead of nothing.
  pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
    self.diagnostics = diagnostics;
    self
  }

  fn client(&self, credentials: Credentials) -> ClickyClient<F, O> {
    let client = ClickyClient::new(credentials, self.fetcher.clone(), self.options.clone())
      .with_secure(self.secure);

    match &self.endpoint {
      Some(endpoint) => client.with_endpoint(endpoint.clone()),
      None => client,
    }
  }

  /// Render the widget, serving a cached render when one is live.
  ///
  /// Never fails: errors render as nothing (or a diagnostic comment) and are
  /// not cached.
  pub async fn render(
    &self,
    widget_id: &str,
    instance: &WidgetInstance,
    chrome: &WidgetChrome,
  ) -> String {
    let cache_key = output_cache_key(widget_id);

    match self.transients.get(&cache_key) {
      Ok(Some(html)) => {
        debug!(widget_id, "Widget output cache hit");
        return html;
      }
      Ok(None) => {}
      Err(e) => warn!(error = %e, widget_id, "Failed to read widget output cache"),
    }

    let Some(credentials) = instance.credentials() else {
      debug!(widget_id, "Widget has no Clicky credentials, skipping");
      return String::new();
    };

    let mut client = self.client(credentials);
    let args = QueryArgs::new()
      .with("limit", instance.number.saturating_add(EXTRA_RESULTS))
      .with("date", instance.date.as_str())
      .with("output", "json");

    let items = match client.get(PAGES_REPORT, &args).await {
      Ok(payload) => self.popular_items(&payload, instance),
      Err(e) => Err(format!("{} ({})", e, e.code())),
    };

    let html = match items {
      Ok(items) if items.is_empty() => String::new(),
      Ok(items) => {
        let shown = items.len().min(instance.number as usize);
        render_list(&items[..shown], instance, chrome)
      }
      Err(message) => {
        warn!(widget_id, error = %message, "Failed to build popular posts");
        return self.diagnostic(&message);
      }
    };

    if let Err(e) = self
      .transients
      .set(&cache_key, &html, Duration::hours(OUTPUT_CACHE_HOURS))
    {
      warn!(error = %e, widget_id, "Failed to store widget output cache");
    }

    html
  }

  /// Render with the widget's saved settings, or `defaults` if none were saved.
  pub async fn render_saved(
    &self,
    widget_id: &str,
    defaults: &WidgetInstance,
    chrome: &WidgetChrome,
  ) -> String {
    match self.saved_instance(widget_id) {
      Some(instance) => self.render(widget_id, &instance, chrome).await,
      None => self.render(widget_id, defaults, chrome).await,
    }
  }

  /// Settings stored by the last [`update`](Self::update) of this widget.
  pub fn saved_instance(&self, widget_id: &str) -> Option<WidgetInstance> {
    self.saved_instances().remove(widget_id)
  }

  fn saved_instances(&self) -> BTreeMap<String, WidgetInstance> {
    match self.options.load(INSTANCES_OPTION) {
      Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding unreadable saved widget settings");
        BTreeMap::new()
      }),
      Ok(None) => BTreeMap::new(),
      Err(e) => {
        warn!(error = %e, "Failed to load saved widget settings");
        BTreeMap::new()
      }
    }
  }

  fn save_instance(&self, widget_id: &str, instance: &WidgetInstance) -> Result<()> {
    let mut instances = self.saved_instances();
    instances.insert(widget_id.to_string(), instance.clone());

    let value = serde_json::to_value(&instances)
      .map_err(|e| eyre!("Failed to serialize widget settings: {}", e))?;
    self.options.save(INSTANCES_OPTION, &value)
  }

  /// Save new settings, invalidating the report cache and the output cache.
  ///
  /// Later [`render_saved`](Self::render_saved) calls use the returned settings.
  pub fn update(&self, widget_id: &str, form: WidgetForm) -> WidgetInstance {
    let instance = form.sanitize();

    if let Err(e) = self.save_instance(widget_id, &instance) {
      warn!(error = %e, widget_id, "Failed to save widget settings");
    }

    let credentials = Credentials::new(instance.site_id.clone(), instance.site_key.clone());
    if !self.client(credentials).flush_cache() {
      warn!(widget_id, "Failed to flush report cache on settings update");
    }
    self.flush_output(widget_id);

    instance
  }

  /// Drop the cached render of one widget.
  pub fn flush_output(&self, widget_id: &str) {
    if let Err(e) = self.transients.delete(&output_cache_key(widget_id)) {
      warn!(error = %e, widget_id, "Failed to delete widget output cache");
    }
  }

  /// Resolve, filter and deduplicate the reported pages, most visited first.
  fn popular_items(
    &self,
    payload: &Payload,
    instance: &WidgetInstance,
  ) -> Result<Vec<ContentItem>, String> {
    let urls = top_urls(payload)?;
    let mut seen = HashSet::new();

    let items = urls
      .iter()
      .filter_map(|url| self.resolver.resolve(url))
      .filter(|item| item.id != 0)
      .filter(|item| instance.post_types.contains(&item.post_type))
      .filter(|item| seen.insert(item.id))
      .collect();

    Ok(items)
  }

  fn diagnostic(&self, message: &str) -> String {
    if self.diagnostics {
      // "--" would end the comment early
      format!(
        "<!-- Clicky Popular Posts: {} -->",
        esc_html(message).replace("--", "- -")
      )
    } else {
      String::new()
    }
  }
}

/// Transient name for a widget's cached render.
fn output_cache_key(widget_id: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(widget_id.as_bytes());
  let hash = hex::encode(hasher.finalize());
  format!("clicky_ppw_{}", &hash[..32])
}

/// Widget markup around `items`. An empty slice still gets the title and list.
fn render_list(items: &[ContentItem], instance: &WidgetInstance, chrome: &WidgetChrome) -> String {
  let mut html = String::new();
  html.push_str(&chrome.before_widget);
  html.push_str(&chrome.before_title);
  html.push_str(&esc_html(&instance.title));
  html.push_str(&chrome.after_title);
  html.push_str("<ul>");

  for item in items {
    // Writing into a String can't fail
    let _ = write!(
      html,
      r#"<li><a href="{}" title="{}">{}</a></li>"#,
      esc_attr(item.permalink()),
      esc_attr(&strip_tags(&item.title)),
      esc_html(&item.title),
    );
  }

  html.push_str("</ul>");
  html.push_str(&chrome.after_widget);
  html
}
