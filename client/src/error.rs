use std::path::PathBuf;

use thiserror::Error;

use crate::codec::Encoding;
use crate::params::{BindingKind, Capability};

/// The main error type for `fibre_cache_client`.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Invalid argument: {0}")]
  InvalidArgument(String),

  #[error(transparent)]
  Configuration(#[from] ConfigError),

  #[error("Capability '{capability}' is not supported by the {binding} binding")]
  CapabilityUnsupported {
    capability: Capability,
    binding: BindingKind,
  },

  #[error(transparent)]
  Format(#[from] FormatError),

  #[error("Engine error: {0}")]
  Engine(String),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),

  #[error("Cache handle '{0}' has been disposed")]
  Disposed(String),

  #[error("The cache registry has been shut down")]
  ShutDown,
}

/// Errors raised while locating, reading or validating cache configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("No configuration found for cache '{0}'")]
  NotFound(String),

  #[error("Failed to read configuration file '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse configuration '{origin}': {message}")]
  Parse { origin: String, message: String },

  #[error("Cluster cache '{0}' cannot be initialized in embedded mode")]
  ClusteredEmbedded(String),

  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidValue { field: String, message: String },
}

impl ConfigError {
  /// Read failures may clear up on their own; everything else is final.
  pub fn is_transient(&self) -> bool {
    matches!(self, ConfigError::Read { .. })
  }

  pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
    ConfigError::InvalidValue {
      field: field.to_string(),
      message: message.into(),
    }
  }
}

/// A byte buffer could not be interpreted as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
  #[error("Bytes are not valid {encoding}: {message}")]
  InvalidEncoding { encoding: Encoding, message: String },

  #[error("Input is not in a correct integer format: {0:?}")]
  InvalidInteger(String),

  #[error("Range {start}..{end} is out of bounds for a buffer of length {len}")]
  OutOfBounds { start: usize, end: usize, len: usize },
}

/// Errors returned when a notification cannot be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
  #[error("Listener dispatch lane is full")]
  QueueFull,

  #[error("Listener dispatcher has been stopped")]
  Stopped,
}

/// A specialized `Result` type for `fibre_cache_client` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
