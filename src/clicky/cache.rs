//! Persisted report cache, partitioned by site.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::cache::OptionStore;

use super::response::Payload;

/// Option name holding the cache blob for every site.
pub const CACHE_OPTION: &str = "clicky-api";

/// `site_id -> report_type -> payload`.
///
/// Entries never expire; they are replaced by a newer fetch or dropped by a flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheStore {
  sites: BTreeMap<String, BTreeMap<String, Payload>>,
}

impl CacheStore {
  /// Load the cache blob from storage.
  ///
  /// Never fails: missing, unreadable or malformed blobs give an empty cache.
  pub fn load<S: OptionStore + ?Sized>(store: &S) -> Self {
    match store.load(CACHE_OPTION) {
      Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Discarding malformed report cache");
        Self::default()
      }),
      Ok(None) => Self::default(),
      Err(e) => {
        warn!(error = %e, "Failed to load report cache");
        Self::default()
      }
    }
  }

  /// Write the whole blob back to storage.
  pub fn persist<S: OptionStore + ?Sized>(&self, store: &S) -> Result<()> {
    let value =
      serde_json::to_value(self).map_err(|e| eyre!("Failed to serialize report cache: {}", e))?;
    store.save(CACHE_OPTION, &value)
  }

  pub fn get(&self, site_id: &str, report_type: &str) -> Option<&Payload> {
    self.sites.get(site_id)?.get(report_type)
  }

  /// All cached reports of one site.
  pub fn site(&self, site_id: &str) -> Option<&BTreeMap<String, Payload>> {
    self.sites.get(site_id)
  }

  pub fn insert(&mut self, site_id: &str, report_type: &str, payload: Payload) {
    self
      .sites
      .entry(site_id.to_string())
      .or_default()
      .insert(report_type.to_string(), payload);
  }

  /// Drop every report of `site_id`. Returns whether anything was removed.
  pub fn flush_site(&mut self, site_id: &str) -> bool {
    self.sites.remove(site_id).is_some()
  }

  pub fn is_empty(&self) -> bool {
    self.sites.is_empty()
  }
}
