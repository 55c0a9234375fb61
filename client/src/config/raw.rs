// Serde-facing shapes of the YAML documents. Values are kept close to what a
// user writes (durations as strings); validation happens in `processed`.

use serde::Deserialize;

// --- Per-cache configuration ---

fn default_cache_type() -> String {
  "local-cache".to_string()
}

fn default_in_proc() -> bool {
  true
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigRaw {
  /// When present it must match the identifier the file was looked up by.
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default = "default_cache_type")]
  pub cache_type: String,
  #[serde(default = "default_in_proc")]
  pub in_proc: bool,
  #[serde(default)]
  pub capacity: Option<u64>,
  #[serde(default)]
  pub time_to_live: Option<String>,
  #[serde(default)]
  pub shards: Option<usize>,
}

// --- Registry settings ---

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettingsRaw {
  #[serde(default)]
  pub exceptions_enabled: Option<bool>,
  #[serde(default)]
  pub config_directory: Option<String>,
  #[serde(default)]
  pub dispatcher: DispatcherSettingsRaw,
  #[serde(default)]
  pub lookup_retry: RetrySettingsRaw,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DispatcherSettingsRaw {
  #[serde(default)]
  pub lanes: Option<usize>,
  #[serde(default)]
  pub lane_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RetrySettingsRaw {
  #[serde(default)]
  pub max_attempts: Option<u32>,
  #[serde(default)]
  pub initial_backoff: Option<String>,
  #[serde(default)]
  pub max_backoff: Option<String>,
}
