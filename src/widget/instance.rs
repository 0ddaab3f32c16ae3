//! Widget settings and their sanitization.

use serde::{Deserialize, Serialize};

use crate::clicky::Credentials;

use super::html::strip_tags;

/// Date range codes understood by the stats API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRange {
  #[serde(rename = "last-7-days")]
  Last7Days,
  #[serde(rename = "last-14-days")]
  Last14Days,
  #[default]
  #[serde(rename = "last-30-days")]
  Last30Days,
  #[serde(rename = "last-60-days")]
  Last60Days,
  #[serde(rename = "last-90-days")]
  Last90Days,
  #[serde(rename = "last-180-days")]
  Last180Days,
}

impl DateRange {
  pub const ALL: [DateRange; 6] = [
    DateRange::Last7Days,
    DateRange::Last14Days,
    DateRange::Last30Days,
    DateRange::Last60Days,
    DateRange::Last90Days,
    DateRange::Last180Days,
  ];

  /// Code sent as the `date` argument.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Last7Days => "last-7-days",
      Self::Last14Days => "last-14-days",
      Self::Last30Days => "last-30-days",
      Self::Last60Days => "last-60-days",
      Self::Last90Days => "last-90-days",
      Self::Last180Days => "last-180-days",
    }
  }

  pub fn parse(code: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|range| range.as_str() == code)
  }
}

/// Saved settings of one widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetInstance {
  pub title: String,
  pub site_id: String,
  pub site_key: String,
  /// How many posts to list
  pub number: u32,
  /// Content types allowed in the list
  pub post_types: Vec<String>,
  pub date: DateRange,
}

impl Default for WidgetInstance {
  fn default() -> Self {
    Self {
      title: String::new(),
      site_id: String::new(),
      site_key: String::new(),
      number: 5,
      post_types: vec!["post".to_string()],
      date: DateRange::default(),
    }
  }
}

impl WidgetInstance {
  /// Trimmed credentials, or `None` when either part is blank.
  pub fn credentials(&self) -> Option<Credentials> {
    let site_id = self.site_id.trim();
    let site_key = self.site_key.trim();
    if site_id.is_empty() || site_key.is_empty() {
      return None;
    }
    Some(Credentials::new(site_id, site_key))
  }
}

/// Raw settings as submitted; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetForm {
  pub title: Option<String>,
  pub site_id: Option<String>,
  pub site_key: Option<String>,
  pub number: Option<String>,
  pub post_types: Option<Vec<String>>,
  pub date: Option<String>,
}

impl WidgetForm {
  /// Fill in defaults and clean every field.
  pub fn sanitize(self) -> WidgetInstance {
    let defaults = WidgetInstance::default();

    WidgetInstance {
      title: self
        .title
        .map(|t| strip_tags(&t).trim().to_string())
        .unwrap_or(defaults.title),
      site_id: self
        .site_id
        .map(|s| s.trim().to_string())
        .unwrap_or(defaults.site_id),
      site_key: self
        .site_key
        .map(|s| s.trim().to_string())
        .unwrap_or(defaults.site_key),
      number: self.number.map(|n| absint(&n)).unwrap_or(defaults.number),
      post_types: self.post_types.unwrap_or(defaults.post_types),
      date: self
        .date
        .as_deref()
        .and_then(DateRange::parse)
        .unwrap_or(defaults.date),
    }
  }
}

/// Non-negative integer from user input: leading integer part, sign dropped.
///
/// Anything unparseable is 0; values past `u32::MAX` saturate.
pub fn absint(input: &str) -> u32 {
  let s = input.trim_start();
  let s = s.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(s);
  let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();

  if digits.is_empty() {
    return 0;
  }
  digits
    .parse::<u64>()
    .map_or(u32::MAX, |n| u32::try_from(n).unwrap_or(u32::MAX))
}
