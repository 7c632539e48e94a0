use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Database name; the store lives in `<data_dir>/linkorg/<database>.db`
  pub database: String,
  /// Name of the keyed collection inside the database
  pub collection: String,
  /// Override for the data directory (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  pub assets: AssetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
  /// Origin that scheme-relative asset identifiers resolve against
  pub origin: String,
  /// Identifier of the stored offline page served when everything else fails
  pub fallback: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database: "linkorg".to_string(),
      collection: "links".to_string(),
      data_dir: None,
      assets: AssetsConfig::default(),
    }
  }
}

impl Default for AssetsConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      fallback: "/offline.html".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./linkorg.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/linkorg/config.yaml
  ///
  /// The store works without any configuration, so a missing file yields
  /// the defaults rather than an error.
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
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("linkorg.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("linkorg").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Path of the store database file under the configured data dir, if one
  /// was set explicitly.
  pub fn database_path(&self) -> Option<PathBuf> {
    self
      .data_dir
      .as_ref()
      .map(|dir| dir.join(format!("{}.db", self.database)))
  }

  /// Path of the asset bucket database under the configured data dir.
  pub fn buckets_path(&self) -> Option<PathBuf> {
    self.data_dir.as_ref().map(|dir| dir.join("assets.db"))
  }
}
