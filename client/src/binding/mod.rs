//! Backing implementations a handle can be bound to.
//!
//! A binding is chosen once, when a handle is created: the embedded binding
//! exposes direct storage in this process, the external binding only a
//! network session. The two are not interchangeable afterwards.

mod embedded;
mod remote;
mod stats;

pub use embedded::EmbeddedBinding;
pub use remote::{ConnectRequest, Connector, RemoteBinding, Session, UnavailableConnector};
pub use stats::{SessionStats, SessionStatsSnapshot};

use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::{DispatchError, Result};
use crate::listener::{CacheEventListener, EventContext, EventKind, EventNotification, OperationContext};
use crate::params::{BindingKind, Capability, InitParams};
use crate::task::dispatcher::ListenerDispatcher;

/// The capability surface every backing implementation offers to handles.
pub trait CacheBinding: Send + Sync {
  fn kind(&self) -> BindingKind;

  fn identifier(&self) -> &str;

  fn supports(&self, capability: Capability) -> bool;

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

  fn insert(&self, key: &str, value: Vec<u8>) -> Result<()>;

  /// Returns `true` if the key was present.
  fn remove(&self, key: &str) -> Result<bool>;

  fn contains(&self, key: &str) -> Result<bool>;

  fn clear(&self) -> Result<()>;

  fn register_listener(&self, listener: Arc<dyn CacheEventListener>) -> Result<()>;

  /// Releases the engine or session. Called once, when the owning handle's
  /// reference count drops to zero or the registry shuts down.
  fn release(&self) -> Result<()>;
}

/// Shared services handed to a factory while it builds a binding.
#[derive(Debug, Clone)]
pub struct BindingContext {
  pub dispatcher: Arc<ListenerDispatcher>,
}

impl BindingContext {
  pub fn new(dispatcher: Arc<ListenerDispatcher>) -> Self {
    Self { dispatcher }
  }
}

/// Constructs bindings for a resolved mode.
pub trait BindingFactory: Send + Sync {
  fn embedded(&self, config: &CacheConfig, ctx: &BindingContext) -> Result<Arc<dyn CacheBinding>>;

  fn external(
    &self,
    identifier: &str,
    params: &InitParams,
    ctx: &BindingContext,
  ) -> Result<Arc<dyn CacheBinding>>;
}

/// Builds [`EmbeddedBinding`]s on `fibre_cache` and [`RemoteBinding`]s
/// through a [`Connector`].
pub struct DefaultBindingFactory {
  connector: Arc<dyn Connector>,
}

impl DefaultBindingFactory {
  pub fn new(connector: Arc<dyn Connector>) -> Self {
    Self { connector }
  }

  /// A factory without a connector; external bindings fail with
  /// `CapabilityUnsupported`.
  pub fn embedded_only() -> Self {
    Self::new(Arc::new(UnavailableConnector))
  }
}

impl BindingFactory for DefaultBindingFactory {
  fn embedded(&self, config: &CacheConfig, ctx: &BindingContext) -> Result<Arc<dyn CacheBinding>> {
    Ok(Arc::new(EmbeddedBinding::build(config, ctx.dispatcher.clone())?))
  }

  fn external(
    &self,
    identifier: &str,
    params: &InitParams,
    ctx: &BindingContext,
  ) -> Result<Arc<dyn CacheBinding>> {
    Ok(Arc::new(RemoteBinding::connect(
      identifier,
      params,
      self.connector.as_ref(),
      ctx,
    )?))
  }
}

/// Forwards engine-originated events for one listener to the dispatcher.
#[derive(Clone)]
pub struct EventSink {
  cache_id: Arc<str>,
  listener: Arc<dyn CacheEventListener>,
  dispatcher: Arc<ListenerDispatcher>,
}

impl EventSink {
  pub fn new(
    cache_id: Arc<str>,
    listener: Arc<dyn CacheEventListener>,
    dispatcher: Arc<ListenerDispatcher>,
  ) -> Self {
    Self {
      cache_id,
      listener,
      dispatcher,
    }
  }

  /// Queues one notification. Never runs the callback on the calling thread.
  pub fn emit(
    &self,
    key: &str,
    kind: EventKind,
    operation: OperationContext,
  ) -> std::result::Result<(), DispatchError> {
    self.dispatcher.submit(EventNotification::new(
      self.listener.clone(),
      key,
      operation,
      EventContext::new(self.cache_id.clone(), kind),
    ))
  }
}

impl std::fmt::Debug for EventSink {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventSink")
      .field("cache_id", &self.cache_id)
      .finish_non_exhaustive()
  }
}
