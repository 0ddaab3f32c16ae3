//! SQLite and in-memory implementations of the storage traits.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{OptionStore, TransientStore};

/// SQLite-based storage for options and transients.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the storage at an explicit path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
      }
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("clicky-popular-posts").join("cache.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for storage tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for storage tables.
const STORAGE_SCHEMA: &str = r#"
-- Long-lived blobs (serialized JSON), one row per option name
CREATE TABLE IF NOT EXISTS options (
    option_name TEXT PRIMARY KEY,
    option_value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Expiring values
CREATE TABLE IF NOT EXISTS transients (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transients_expires ON transients(expires_at);
"#;

impl OptionStore for SqliteStorage {
  fn load(&self, key: &str) -> Result<Option<Value>> {
    let conn = self.conn()?;

    let raw: Option<String> = conn
      .query_row(
        "SELECT option_value FROM options WHERE option_name = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load option {}: {}", key, e))?;

    raw
      .map(|s| serde_json::from_str(&s))
      .transpose()
      .map_err(|e| eyre!("Failed to deserialize option {}: {}", key, e))
  }

  fn save(&self, key: &str, value: &Value) -> Result<()> {
    let conn = self.conn()?;
    let data =
      serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize option: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO options (option_name, option_value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to save option {}: {}", key, e))?;

    Ok(())
  }
}

impl TransientStore for SqliteStorage {
  fn get(&self, name: &str) -> Result<Option<String>> {
    let conn = self.conn()?;

    let row: Option<(String, String)> = conn
      .query_row(
        "SELECT value, expires_at FROM transients WHERE name = ?",
        params![name],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load transient {}: {}", name, e))?;

    let Some((value, expires_at)) = row else {
      return Ok(None);
    };

    if parse_datetime(&expires_at)? <= Utc::now() {
      conn
        .execute("DELETE FROM transients WHERE name = ?", params![name])
        .map_err(|e| eyre!("Failed to purge transient {}: {}", name, e))?;
      return Ok(None);
    }

    Ok(Some(value))
  }

  fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()> {
    let conn = self.conn()?;
    let expires_at = format_datetime(Utc::now() + ttl);

    conn
      .execute(
        "INSERT OR REPLACE INTO transients (name, value, expires_at) VALUES (?, ?, ?)",
        params![name, value, expires_at],
      )
      .map_err(|e| eyre!("Failed to store transient {}: {}", name, e))?;

    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    self
      .conn()?
      .execute("DELETE FROM transients WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete transient {}: {}", name, e))?;

    Ok(())
  }
}

/// Storage kept entirely in process memory.
/// Used for ephemeral runs and tests - nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
  options: Mutex<HashMap<String, Value>>,
  transients: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OptionStore for MemoryStorage {
  fn load(&self, key: &str) -> Result<Option<Value>> {
    let options = self
      .options
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(options.get(key).cloned())
  }

  fn save(&self, key: &str, value: &Value) -> Result<()> {
    let mut options = self
      .options
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    options.insert(key.to_string(), value.clone());
    Ok(())
  }
}

impl TransientStore for MemoryStorage {
  fn get(&self, name: &str) -> Result<Option<String>> {
    let mut transients = self
      .transients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    match transients.get(name) {
      Some((_, expires_at)) if *expires_at <= Utc::now() => {
        transients.remove(name);
        Ok(None)
      }
      Some((value, _)) => Ok(Some(value.clone())),
      None => Ok(None),
    }
  }

  fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()> {
    let mut transients = self
      .transients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    transients.insert(name.to_string(), (value.to_string(), Utc::now() + ttl));
    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    let mut transients = self
      .transients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    transients.remove(name);
    Ok(())
  }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_sqlite_option_missing_is_none() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.load("clicky-api").unwrap(), None);
  }

  #[test]
  fn test_sqlite_option_save_and_load() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let value = json!({"123": {"pages": {"kind": "text", "value": "<xml/>"}}});

    storage.save("clicky-api", &value).unwrap();
    assert_eq!(storage.load("clicky-api").unwrap(), Some(value));
  }

  #[test]
  fn test_sqlite_option_save_replaces() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.save("clicky-api", &json!({"a": 1})).unwrap();
    storage.save("clicky-api", &json!({"b": 2})).unwrap();

    assert_eq!(storage.load("clicky-api").unwrap(), Some(json!({"b": 2})));
  }

  #[test]
  fn test_sqlite_clones_share_connection() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let other = storage.clone();
    storage.save("shared", &json!(true)).unwrap();

    assert_eq!(other.load("shared").unwrap(), Some(json!(true)));
  }

  #[test]
  fn test_sqlite_transient_roundtrip() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .set("widget", "<ul></ul>", Duration::hours(24))
      .unwrap();

    assert_eq!(
      TransientStore::get(&storage, "widget").unwrap().as_deref(),
      Some("<ul></ul>")
    );
  }

  #[test]
  fn test_sqlite_transient_expired_is_absent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set("widget", "stale", Duration::seconds(-5)).unwrap();

    assert_eq!(TransientStore::get(&storage, "widget").unwrap(), None);
    // Purged on read
    let count: i64 = storage
      .conn()
      .unwrap()
      .query_row("SELECT COUNT(*) FROM transients", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 0);
  }

  #[test]
  fn test_sqlite_transient_delete() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set("widget", "x", Duration::hours(1)).unwrap();
    storage.delete("widget").unwrap();
    storage.delete("missing").unwrap();

    assert_eq!(TransientStore::get(&storage, "widget").unwrap(), None);
  }

  #[test]
  fn test_memory_transient_expiry() {
    let storage = MemoryStorage::new();
    storage.set("fresh", "a", Duration::hours(1)).unwrap();
    storage.set("old", "b", Duration::seconds(-1)).unwrap();

    assert_eq!(TransientStore::get(&storage, "fresh").unwrap().as_deref(), Some("a"));
    assert_eq!(TransientStore::get(&storage, "old").unwrap(), None);
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-01-15 10:30:00").unwrap();
    assert_eq!(format_datetime(dt), "2024-01-15 10:30:00");
    assert!(parse_datetime("not a date").is_err());
  }
}
