//! Core traits for the storage collaborators.

use chrono::Duration;
use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;

/// Persisted key-value storage for long-lived blobs.
///
/// A missing key is `Ok(None)`, never an error.
pub trait OptionStore: Send + Sync {
  /// Load the value stored under `key`.
  fn load(&self, key: &str) -> Result<Option<Value>>;

  /// Replace the value stored under `key`.
  fn save(&self, key: &str, value: &Value) -> Result<()>;
}

/// Short-lived storage where every entry carries its own expiry.
pub trait TransientStore: Send + Sync {
  /// Get a live entry. Expired entries are reported as absent.
  fn get(&self, name: &str) -> Result<Option<String>>;

  /// Store `value` under `name` for `ttl`.
  fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()>;

  /// Remove an entry. Removing a missing entry is not an error.
  fn delete(&self, name: &str) -> Result<()>;
}

impl<T: OptionStore + ?Sized> OptionStore for Arc<T> {
  fn load(&self, key: &str) -> Result<Option<Value>> {
    (**self).load(key)
  }

  fn save(&self, key: &str, value: &Value) -> Result<()> {
    (**self).save(key, value)
  }
}

impl<T: TransientStore + ?Sized> TransientStore for Arc<T> {
  fn get(&self, name: &str) -> Result<Option<String>> {
    (**self).get(name)
  }

  fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()> {
    (**self).set(name, value, ttl)
  }

  fn delete(&self, name: &str) -> Result<()> {
    (**self).delete(name)
  }
}
