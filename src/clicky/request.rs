//! Request building: query arguments, output formats and signed URLs.

use indexmap::IndexMap;
use std::fmt;
use tracing::debug;
use url::Url;

use super::client::Credentials;

/// Query argument that selects the response encoding. Never sent upstream.
pub const OUTPUT_ARG: &str = "output";

/// Arguments always supplied by the client itself.
const RESERVED_ARGS: &[&str] = &["type", "site_id", "sitekey"];

/// Wire encoding requested for the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
  Json,
  /// PHP native serialization. Passed through as raw text.
  Php,
  Xml,
  Csv,
  /// No `output` argument given; the API answers with XML.
  Default,
}

impl OutputFormat {
  /// Map the value of the `output` argument to a format.
  ///
  /// Returns `None` for values the client doesn't know how to handle.
  pub fn from_arg(value: Option<&str>) -> Option<Self> {
    match value {
      None => Some(Self::Default),
      Some("json") => Some(Self::Json),
      Some("php") => Some(Self::Php),
      Some("xml") => Some(Self::Xml),
      Some("csv") => Some(Self::Csv),
      Some(_) => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Json => "json",
      Self::Php => "php",
      Self::Xml => "xml",
      Self::Csv => "csv",
      Self::Default => "default",
    }
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Insertion-ordered query arguments for a report request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
  args: IndexMap<String, String>,
}

impl QueryArgs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set an argument. An existing key keeps its position and gets the new value.
  pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
    self.args.insert(key.into(), value.to_string());
    self
  }

  /// Builder-style [`set`](Self::set).
  pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.set(key, value);
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.args.get(key).map(String::as_str)
  }

  /// The requested output format argument, if any.
  pub fn output(&self) -> Option<&str> {
    self.get(OUTPUT_ARG)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.args.is_empty()
  }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryArgs {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut args = Self::new();
    for (k, v) in iter {
      args.set(k, v);
    }
    args
  }
}

/// Build the signed request URL for a report.
///
/// Query order: `type`, caller arguments (minus `output` and reserved keys),
/// `site_id`, `sitekey`.
///
/// Caller values for `type`, `site_id` and `sitekey` are dropped (logged at
/// debug level): the report type and credentials always come from the client.
pub fn build_url(
  endpoint: &Url,
  secure: bool,
  credentials: &Credentials,
  report_type: &str,
  args: &QueryArgs,
) -> Url {
  let mut url = endpoint.clone();

  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }

  if secure && url.scheme() == "http" {
    // http -> https is always a permitted scheme change
    let _ = url.set_scheme("https");
  }

  {
    let mut query = url.query_pairs_mut();
    query.append_pair("type", report_type);
    for (key, value) in args.iter() {
      if key == OUTPUT_ARG {
        continue;
      }
      if is_reserved(key) {
        debug!(arg = key, "Dropping reserved query argument");
        continue;
      }
      query.append_pair(key, value);
    }
    query.append_pair("site_id", &credentials.site_id);
    query.append_pair("sitekey", &credentials.site_key);
  }

  url
}

/// Whether `key` is set by the client and can't be overridden by callers.
pub fn is_reserved(key: &str) -> bool {
  RESERVED_ARGS.contains(&key)
}

/// Copy of `url` safe for logs: the site key is masked.
pub fn redact(url: &Url) -> String {
  let mut redacted = url.clone();
  let pairs: Vec<(String, String)> = url
    .query_pairs()
    .map(|(k, v)| {
      let v = if k == "sitekey" {
        "***".to_string()
      } else {
        v.into_owned()
      };
      (k.into_owned(), v)
    })
    .collect();

  redacted.query_pairs_mut().clear().extend_pairs(pairs);
  redacted.to_string()
}
