//! Serde types matching the JSON output of the stats API.
//!
//! A JSON response is a list of reports, one per requested type; each report
//! holds one entry per date range, each listing its items.

use serde::Deserialize;
use serde_json::Value;

use super::response::Payload;

#[derive(Debug, Deserialize)]
pub struct ApiReport {
  #[serde(rename = "type", default)]
  pub report_type: String,
  #[serde(default)]
  pub dates: Vec<ApiDateRange>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDateRange {
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiItem {
  #[serde(default)]
  pub title: String,
  pub url: Option<String>,
  // Counts come back as strings ("12") or numbers depending on the report
  pub value: Option<Value>,
}

/// Parse a decoded payload as a list of reports.
pub fn reports(payload: &Payload) -> Result<Vec<ApiReport>, String> {
  let value = payload
    .as_json()
    .ok_or_else(|| "expected a JSON response".to_string())?;
  Vec::<ApiReport>::deserialize(value).map_err(|e| e.to_string())
}

/// URLs of the first date range of the first report, in ranking order.
///
/// Items without a URL are skipped.
pub fn top_urls(payload: &Payload) -> Result<Vec<String>, String> {
  let reports = reports(payload)?;
  let range = reports
    .into_iter()
    .next()
    .and_then(|report| report.dates.into_iter().next())
    .ok_or_else(|| "response holds no date range".to_string())?;

  Ok(range.items.into_iter().filter_map(|item| item.url).collect())
}
