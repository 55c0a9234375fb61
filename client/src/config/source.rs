use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::config::processed::CacheConfig;
use crate::error::ConfigError;

/// Supplies per-identifier cache configuration.
///
/// Implementations may block on I/O. A [`ConfigError::Read`] is treated as
/// transient and retried by the resolver; every other error is final.
pub trait ConfigSource: Send + Sync {
  fn load(&self, identifier: &str) -> Result<CacheConfig, ConfigError>;
}

/// Reads `<root>/<identifier>.yaml` (or `.yml`) and memoizes parsed results.
#[derive(Debug)]
pub struct YamlDirectory {
  root: PathBuf,
  memo: DashMap<String, CacheConfig>,
}

impl YamlDirectory {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      memo: DashMap::new(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Drops the memoized configuration so the next lookup re-reads the file.
  pub fn invalidate(&self, identifier: &str) -> bool {
    self.memo.remove(identifier).is_some()
  }

  fn read(&self, identifier: &str) -> Result<String, ConfigError> {
    for extension in ["yaml", "yml"] {
      let path = self.root.join(format!("{identifier}.{extension}"));
      match fs::read_to_string(&path) {
        Ok(text) => {
          debug!(cache_id = identifier, path = %path.display(), "read cache configuration");
          return Ok(text);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
        Err(source) => return Err(ConfigError::Read { path, source }),
      }
    }
    Err(ConfigError::NotFound(identifier.to_string()))
  }
}

impl ConfigSource for YamlDirectory {
  fn load(&self, identifier: &str) -> Result<CacheConfig, ConfigError> {
    if identifier.contains(['/', '\\']) || identifier.starts_with('.') {
      return Err(ConfigError::invalid(
        "identifier",
        format!("'{identifier}' cannot be used as a configuration file name"),
      ));
    }
    if let Some(config) = self.memo.get(identifier) {
      return Ok(config.value().clone());
    }
    let text = self.read(identifier)?;
    let config = CacheConfig::from_yaml_str(identifier, &text)?;
    self.memo.insert(identifier.to_string(), config.clone());
    Ok(config)
  }
}

/// An in-memory set of configurations, for programmatic setup.
#[derive(Debug, Default)]
pub struct StaticConfigSource {
  configs: DashMap<String, CacheConfig>,
}

impl StaticConfigSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a configuration, builder style.
  pub fn with(self, config: CacheConfig) -> Self {
    self.insert(config);
    self
  }

  pub fn insert(&self, config: CacheConfig) {
    self.configs.insert(config.identifier.clone(), config);
  }

  pub fn remove(&self, identifier: &str) -> Option<CacheConfig> {
    self.configs.remove(identifier).map(|(_, config)| config)
  }
}

impl ConfigSource for StaticConfigSource {
  fn load(&self, identifier: &str) -> Result<CacheConfig, ConfigError> {
    self
      .configs
      .get(identifier)
      .map(|config| config.value().clone())
      .ok_or_else(|| ConfigError::NotFound(identifier.to_string()))
  }
}
