use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// How the caller would like a cache identifier to be realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
  /// Let the configuration decide, falling back to an external connection
  /// when no configuration can be found.
  #[default]
  Automatic,
  /// Run the engine inside this process.
  Embedded,
  /// Connect to a separately running cache service. No configuration lookup
  /// is performed.
  External,
}

impl fmt::Display for CacheMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheMode::Automatic => write!(f, "automatic"),
      CacheMode::Embedded => write!(f, "embedded"),
      CacheMode::External => write!(f, "external"),
    }
  }
}

/// The effective mode a handle ends up bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
  Embedded,
  External,
}

impl fmt::Display for BindingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BindingKind::Embedded => write!(f, "embedded"),
      BindingKind::External => write!(f, "external"),
    }
  }
}

/// Optional features a binding may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
  /// Direct access to the engine's storage from this process.
  DirectStorage,
  /// Delivery of item added/updated/removed events to listeners.
  EventNotifications,
  /// Additional handle objects sharing one engine instance.
  SecondaryHandles,
  /// Spreading client connections across the servers of a cluster.
  LoadBalancing,
  /// Opening a session to an out-of-process cache service at all.
  RemoteConnection,
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Capability::DirectStorage => write!(f, "direct_storage"),
      Capability::EventNotifications => write!(f, "event_notifications"),
      Capability::SecondaryHandles => write!(f, "secondary_handles"),
      Capability::LoadBalancing => write!(f, "load_balancing"),
      Capability::RemoteConnection => write!(f, "remote_connection"),
    }
  }
}

/// A user id / password pair presented to a cache server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub user_id: String,
  pub password: String,
}

impl Credentials {
  pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      password: password.into(),
    }
  }
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("user_id", &self.user_id)
      .field("password", &"<redacted>")
      .finish()
  }
}

pub const DEFAULT_SERVER: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9800;

/// Parameters supplied with every `acquire` call.
///
/// Only `mode` matters for embedded caches; the connection fields are
/// consumed by the external binding.
#[derive(Debug, Clone)]
pub struct InitParams {
  pub mode: CacheMode,
  /// Server to connect to. `None` means [`DEFAULT_SERVER`].
  pub server: Option<String>,
  pub port: u16,
  /// How many times a failed connection attempt is retried.
  pub connection_retries: u32,
  /// Pause between two connection attempts.
  pub retry_interval: Duration,
  /// Upper bound for blocking work against the service. The whole connect
  /// retry schedule stays within it, and connectors are expected to bound
  /// each call they make by it.
  pub operation_timeout: Duration,
  pub load_balance: bool,
  pub primary_credentials: Option<Credentials>,
  pub secondary_credentials: Option<Credentials>,
  /// Capabilities the external session must offer, checked right after
  /// connecting.
  pub capabilities: Vec<Capability>,
}

impl Default for InitParams {
  fn default() -> Self {
    Self {
      mode: CacheMode::Automatic,
      server: None,
      port: DEFAULT_PORT,
      connection_retries: 5,
      retry_interval: Duration::from_secs(1),
      operation_timeout: Duration::from_secs(90),
      load_balance: false,
      primary_credentials: None,
      secondary_credentials: None,
      capabilities: Vec::new(),
    }
  }
}

impl InitParams {
  /// Default parameters with the given mode.
  pub fn with_mode(mode: CacheMode) -> Self {
    Self {
      mode,
      ..Self::default()
    }
  }

  pub fn server_or_default(&self) -> &str {
    self.server.as_deref().unwrap_or(DEFAULT_SERVER)
  }

  /// Every capability the session is required to offer, including the ones
  /// implied by other settings.
  pub(crate) fn required_capabilities(&self) -> Vec<Capability> {
    let mut required = self.capabilities.clone();
    if self.load_balance && !required.contains(&Capability::LoadBalancing) {
      required.push(Capability::LoadBalancing);
    }
    required
  }
}
