use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binding::stats::SessionStats;
use crate::binding::{BindingContext, CacheBinding, EventSink};
use crate::error::{Error, Result};
use crate::listener::CacheEventListener;
use crate::params::{BindingKind, Capability, InitParams};
use crate::retry::RetryPolicy;
use crate::task::dispatcher::ListenerDispatcher;

/// Everything a connector needs to open one session.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
  pub identifier: &'a str,
  pub params: &'a InitParams,
  /// 1-based attempt number within the current retry schedule.
  pub attempt: u32,
}

impl ConnectRequest<'_> {
  pub fn server(&self) -> &str {
    self.params.server_or_default()
  }

  pub fn port(&self) -> u16 {
    self.params.port
  }
}

/// An open session with an out-of-process cache service.
///
/// The wire protocol lives behind this trait. Implementations must bound every
/// blocking call by the operation timeout they were connected with.
pub trait Session: Send + Sync {
  fn supports(&self, capability: Capability) -> bool;

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

  fn insert(&self, key: &str, value: &[u8]) -> Result<()>;

  fn remove(&self, key: &str) -> Result<bool>;

  fn contains(&self, key: &str) -> Result<bool> {
    Ok(self.get(key)?.is_some())
  }

  fn clear(&self) -> Result<()>;

  /// Starts delivering server-side item events to `sink`. Only called when
  /// the session reports [`Capability::EventNotifications`].
  fn subscribe(&self, sink: EventSink) -> Result<()>;

  fn close(&self) -> Result<()>;
}

/// Opens sessions. Errors other than `CapabilityUnsupported` are treated as
/// connection failures and retried by the binding.
pub trait Connector: Send + Sync {
  fn connect(&self, request: &ConnectRequest<'_>) -> Result<Box<dyn Session>>;
}

/// A connector for registries that only ever run embedded caches.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableConnector;

impl Connector for UnavailableConnector {
  fn connect(&self, _request: &ConnectRequest<'_>) -> Result<Box<dyn Session>> {
    Err(Error::CapabilityUnsupported {
      capability: Capability::RemoteConnection,
      binding: BindingKind::External,
    })
  }
}

/// A connection-managed binding to an external cache service.
pub struct RemoteBinding {
  identifier: Arc<str>,
  session: Box<dyn Session>,
  stats: Arc<SessionStats>,
  dispatcher: Arc<ListenerDispatcher>,
  released: AtomicBool,
}

impl RemoteBinding {
  /// Opens a session, retrying failed attempts `params.connection_retries`
  /// times with `params.retry_interval` between them. No retry is started
  /// once `params.operation_timeout` has run out.
  pub fn connect(
    identifier: &str,
    params: &InitParams,
    connector: &dyn Connector,
    ctx: &BindingContext,
  ) -> Result<Self> {
    let stats = Arc::new(SessionStats::new(identifier));
    let policy = RetryPolicy::fixed(
      params.connection_retries.saturating_add(1),
      params.retry_interval,
    );

    let session = policy.run_within(
      params.operation_timeout,
      |attempt| {
        stats.record_connect_attempt();
        connector.connect(&ConnectRequest {
          identifier,
          params,
          attempt,
        })
      },
      |err| !matches!(err, Error::CapabilityUnsupported { .. }),
    )?;

    for capability in params.required_capabilities() {
      if !session.supports(capability) {
        if let Err(err) = session.close() {
          warn!(cache_id = identifier, error = %err, "failed to close rejected session");
        }
        return Err(Error::CapabilityUnsupported {
          capability,
          binding: BindingKind::External,
        });
      }
    }

    info!(
      cache_id = identifier,
      server = params.server_or_default(),
      port = params.port,
      "connected to external cache"
    );
    Ok(Self {
      identifier: Arc::from(identifier),
      session,
      stats,
      dispatcher: ctx.dispatcher.clone(),
      released: AtomicBool::new(false),
    })
  }

  pub fn stats(&self) -> &Arc<SessionStats> {
    &self.stats
  }

  fn ensure_live(&self) -> Result<()> {
    if self.released.load(Ordering::Acquire) {
      Err(Error::Disposed(self.identifier.to_string()))
    } else {
      Ok(())
    }
  }
}

impl CacheBinding for RemoteBinding {
  fn kind(&self) -> BindingKind {
    BindingKind::External
  }

  fn identifier(&self) -> &str {
    &self.identifier
  }

  fn supports(&self, capability: Capability) -> bool {
    match capability {
      Capability::DirectStorage | Capability::SecondaryHandles => false,
      Capability::RemoteConnection => true,
      other => self.session.supports(other),
    }
  }

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.ensure_live()?;
    let result = self.session.get(key);
    self.stats.record(&result);
    if let Ok(value) = &result {
      self.stats.record_lookup(value.as_deref());
    }
    result
  }

  fn insert(&self, key: &str, value: Vec<u8>) -> Result<()> {
    self.ensure_live()?;
    let result = self.session.insert(key, &value);
    self.stats.record(&result);
    if result.is_ok() {
      self.stats.record_sent(value.len());
    }
    result
  }

  fn remove(&self, key: &str) -> Result<bool> {
    self.ensure_live()?;
    let result = self.session.remove(key);
    self.stats.record(&result);
    result
  }

  fn contains(&self, key: &str) -> Result<bool> {
    self.ensure_live()?;
    let result = self.session.contains(key);
    self.stats.record(&result);
    result
  }

  fn clear(&self) -> Result<()> {
    self.ensure_live()?;
    let result = self.session.clear();
    self.stats.record(&result);
    result
  }

  fn register_listener(&self, listener: Arc<dyn CacheEventListener>) -> Result<()> {
    self.ensure_live()?;
    if !self.session.supports(Capability::EventNotifications) {
      return Err(Error::CapabilityUnsupported {
        capability: Capability::EventNotifications,
        binding: BindingKind::External,
      });
    }
    self.session.subscribe(EventSink::new(
      self.identifier.clone(),
      listener,
      self.dispatcher.clone(),
    ))
  }

  fn release(&self) -> Result<()> {
    if self.released.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    debug!(cache_id = %self.identifier, stats = %self.stats.snapshot(), "closing external session");
    self.session.close()
  }
}

impl std::fmt::Debug for RemoteBinding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RemoteBinding")
      .field("identifier", &self.identifier)
      .field("stats", &self.stats.snapshot())
      .finish_non_exhaustive()
  }
}
