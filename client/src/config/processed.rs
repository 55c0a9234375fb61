use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::raw::{CacheConfigRaw, RegistrySettingsRaw, RetrySettingsRaw};
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// How a cache is laid out across servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
  /// A single-node cache that may run inside the client process.
  Local,
  /// A cache partitioned or replicated across several servers. It can only
  /// be reached through an external connection.
  Clustered,
}

impl Topology {
  fn parse(cache_type: &str) -> Result<Self, ConfigError> {
    match cache_type.trim().to_ascii_lowercase().as_str() {
      "local" | "local-cache" => Ok(Topology::Local),
      "clustered" | "clustered-cache" => Ok(Topology::Clustered),
      other => Err(ConfigError::invalid(
        "cache_type",
        format!("unknown cache type '{other}', expected 'local-cache' or 'clustered-cache'"),
      )),
    }
  }
}

/// Topology metadata and engine settings for one cache identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
  pub identifier: String,
  pub topology: Topology,
  /// Preferred realization when the caller asked for automatic mode.
  pub in_proc: bool,
  pub capacity: Option<u64>,
  pub time_to_live: Option<Duration>,
  pub shards: Option<usize>,
}

impl CacheConfig {
  /// A local, in-process configuration with engine defaults.
  pub fn local(identifier: impl Into<String>) -> Self {
    Self {
      identifier: identifier.into(),
      topology: Topology::Local,
      in_proc: true,
      capacity: None,
      time_to_live: None,
      shards: None,
    }
  }

  /// A clustered configuration.
  pub fn clustered(identifier: impl Into<String>) -> Self {
    Self {
      topology: Topology::Clustered,
      in_proc: false,
      ..Self::local(identifier)
    }
  }

  pub fn is_clustered(&self) -> bool {
    self.topology == Topology::Clustered
  }

  /// Parses and validates a YAML document describing `identifier`.
  pub fn from_yaml_str(identifier: &str, text: &str) -> Result<Self, ConfigError> {
    let raw: CacheConfigRaw = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
      origin: identifier.to_string(),
      message: e.to_string(),
    })?;
    Self::from_raw(identifier, raw)
  }

  pub(crate) fn from_raw(identifier: &str, raw: CacheConfigRaw) -> Result<Self, ConfigError> {
    if let Some(name) = &raw.name {
      if name != identifier {
        return Err(ConfigError::invalid(
          "name",
          format!("configuration names cache '{name}' but was loaded for '{identifier}'"),
        ));
      }
    }
    if raw.capacity == Some(0) {
      return Err(ConfigError::invalid("capacity", "capacity cannot be zero"));
    }
    if raw.shards == Some(0) {
      return Err(ConfigError::invalid("shards", "shard count cannot be zero"));
    }
    let time_to_live = raw
      .time_to_live
      .as_deref()
      .map(|text| parse_duration("time_to_live", text))
      .transpose()?;

    Ok(Self {
      identifier: identifier.to_string(),
      topology: Topology::parse(&raw.cache_type)?,
      in_proc: raw.in_proc,
      capacity: raw.capacity,
      time_to_live,
      shards: raw.shards,
    })
  }
}

pub(crate) fn parse_duration(field: &str, text: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(text.trim())
    .map_err(|e| ConfigError::invalid(field, format!("'{text}' is not a duration: {e}")))
}

/// Validated settings for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
  /// Initial value of the registry-wide exceptions flag.
  pub exceptions_enabled: bool,
  /// Directory holding `<identifier>.yaml` cache configurations.
  pub config_directory: Option<PathBuf>,
  /// Number of dispatcher worker lanes. `None` means one per CPU.
  pub dispatcher_lanes: Option<usize>,
  /// Per-lane queue bound. `None` (the default) keeps lanes unbounded, so no
  /// notification is ever refused for lack of room.
  pub lane_capacity: Option<usize>,
  /// Retry schedule for configuration lookups.
  pub lookup_retry: RetryPolicy,
}

impl Default for RegistrySettings {
  fn default() -> Self {
    Self {
      exceptions_enabled: true,
      config_directory: None,
      dispatcher_lanes: None,
      lane_capacity: None,
      lookup_retry: RetryPolicy::default(),
    }
  }
}

impl RegistrySettings {
  pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
    let raw: RegistrySettingsRaw = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
      origin: "registry settings".to_string(),
      message: e.to_string(),
    })?;
    Self::from_raw(raw)
  }

  pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml_str(&text)
  }

  /// Rejects settings the registry cannot run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.dispatcher_lanes == Some(0) {
      return Err(ConfigError::invalid("dispatcher.lanes", "lane count cannot be zero"));
    }
    if self.lane_capacity == Some(0) {
      return Err(ConfigError::invalid(
        "dispatcher.lane_capacity",
        "lane capacity cannot be zero",
      ));
    }
    if self.lookup_retry.max_attempts == 0 {
      return Err(ConfigError::invalid(
        "lookup_retry.max_attempts",
        "at least one attempt is required",
      ));
    }
    Ok(())
  }

  fn from_raw(raw: RegistrySettingsRaw) -> Result<Self, ConfigError> {
    let defaults = Self::default();
    let settings = Self {
      exceptions_enabled: raw.exceptions_enabled.unwrap_or(defaults.exceptions_enabled),
      config_directory: raw.config_directory.map(PathBuf::from),
      dispatcher_lanes: raw.dispatcher.lanes,
      lane_capacity: raw.dispatcher.lane_capacity.or(defaults.lane_capacity),
      lookup_retry: retry_from_raw(raw.lookup_retry, defaults.lookup_retry)?,
    };
    settings.validate()?;
    Ok(settings)
  }
}

fn retry_from_raw(raw: RetrySettingsRaw, defaults: RetryPolicy) -> Result<RetryPolicy, ConfigError> {
  let initial_backoff = match raw.initial_backoff.as_deref() {
    Some(text) => parse_duration("lookup_retry.initial_backoff", text)?,
    None => defaults.initial_backoff,
  };
  let max_backoff = match raw.max_backoff.as_deref() {
    Some(text) => parse_duration("lookup_retry.max_backoff", text)?,
    None => defaults.max_backoff.max(initial_backoff),
  };
  if max_backoff < initial_backoff {
    return Err(ConfigError::invalid(
      "lookup_retry.max_backoff",
      "must not be shorter than initial_backoff",
    ));
  }
  Ok(RetryPolicy::new(
    raw.max_attempts.unwrap_or(defaults.max_attempts),
    initial_backoff,
    max_backoff,
  ))
}
