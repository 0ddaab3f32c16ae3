use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::clicky::Credentials;
use crate::widget::{ContentItem, DateRange, WidgetChrome, WidgetInstance};

/// Environment variable that overrides `clicky.site_key`.
const SITE_KEY_ENV: &str = "CLICKY_SITE_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub clicky: ClickyConfig,
  #[serde(default)]
  pub widget: WidgetConfig,
  /// Site content the widget can link to
  #[serde(default)]
  pub content: Vec<ContentItem>,
  /// Cache database location (defaults to the user data directory)
  pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickyConfig {
  pub site_id: String,
  /// Prefer the CLICKY_SITE_KEY environment variable over storing it here
  pub site_key: Option<String>,
  /// Stats endpoint override
  pub endpoint: Option<String>,
  /// Treat the calling context as secure (requests go over https)
  #[serde(default)]
  pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
  /// Widget instance identity, keys the output cache
  pub id: String,
  pub title: String,
  pub number: u32,
  pub post_types: Vec<String>,
  pub date: DateRange,
  pub chrome: WidgetChrome,
  /// Render failures as HTML comments
  pub diagnostics: bool,
}

impl Default for WidgetConfig {
  fn default() -> Self {
    let instance = WidgetInstance::default();
    Self {
      id: "clicky-popular-posts-widget-1".to_string(),
      title: instance.title,
      number: instance.number,
      post_types: instance.post_types,
      date: instance.date,
      chrome: WidgetChrome::default(),
      diagnostics: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clicky.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clicky-popular-posts/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/clicky-popular-posts/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("clicky.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clicky-popular-posts").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the site key.
  ///
  /// Checks CLICKY_SITE_KEY first, then the config file.
  pub fn site_key(&self) -> Result<String> {
    self.site_key_from(std::env::var(SITE_KEY_ENV).ok())
  }

  /// Resolve the site key given the value of CLICKY_SITE_KEY, if set.
  ///
  /// A blank environment value falls through to the config file.
  pub fn site_key_from(&self, env_key: Option<String>) -> Result<String> {
    env_key
      .filter(|key| !key.trim().is_empty())
      .or_else(|| self.clicky.site_key.clone())
      .filter(|key| !key.trim().is_empty())
      .ok_or_else(|| {
        eyre!("Clicky site key not found. Set CLICKY_SITE_KEY or clicky.site_key in the config.")
      })
  }

  pub fn credentials(&self) -> Result<Credentials> {
    Ok(self.credentials_with(&self.site_key()?))
  }

  fn credentials_with(&self, site_key: &str) -> Credentials {
    Credentials::new(self.clicky.site_id.trim(), site_key.trim())
  }

  /// Parsed endpoint override, if configured.
  pub fn endpoint(&self) -> Result<Option<Url>> {
    self
      .clicky
      .endpoint
      .as_deref()
      .map(|e| Url::parse(e).map_err(|err| eyre!("Invalid endpoint '{}': {}", e, err)))
      .transpose()
  }

  /// Widget settings combined with the site credentials.
  pub fn widget_instance(&self) -> Result<WidgetInstance> {
    Ok(self.widget_instance_with(self.credentials()?))
  }

  fn widget_instance_with(&self, credentials: Credentials) -> WidgetInstance {
    WidgetInstance {
      title: self.widget.title.clone(),
      site_id: credentials.site_id,
      site_key: credentials.site_key,
      number: self.widget.number,
      post_types: self.widget.post_types.clone(),
      date: self.widget.date,
    }
  }
}
