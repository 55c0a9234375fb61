use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fibre_cache::{Cache, CacheBuilder};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::binding::{CacheBinding, EventSink};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::listener::{CacheEventListener, EventKind, OperationContext};
use crate::params::{BindingKind, Capability};
use crate::task::dispatcher::ListenerDispatcher;

/// An in-process engine: a `fibre_cache::Cache` keyed by item key.
///
/// One instance may be shared by a primary handle and any number of
/// secondary handles.
pub struct EmbeddedBinding {
  identifier: Arc<str>,
  cache: Cache<String, Vec<u8>>,
  sinks: RwLock<Vec<EventSink>>,
  dispatcher: Arc<ListenerDispatcher>,
  released: AtomicBool,
}

impl EmbeddedBinding {
  /// Builds the engine from local configuration.
  pub fn build(config: &CacheConfig, dispatcher: Arc<ListenerDispatcher>) -> Result<Self> {
    let mut builder = CacheBuilder::<String, Vec<u8>>::default();
    if let Some(capacity) = config.capacity {
      builder = builder.capacity(capacity);
    }
    if let Some(ttl) = config.time_to_live {
      builder = builder.time_to_live(ttl);
    }
    if let Some(shards) = config.shards {
      builder = builder.shards(shards);
    }
    let cache = builder.build().map_err(|e| {
      Error::Engine(format!(
        "failed to build embedded engine for '{}': {e}",
        config.identifier
      ))
    })?;

    debug!(cache_id = %config.identifier, capacity = ?config.capacity, "embedded engine built");
    Ok(Self {
      identifier: Arc::from(config.identifier.as_str()),
      cache,
      sinks: RwLock::new(Vec::new()),
      dispatcher,
      released: AtomicBool::new(false),
    })
  }

  fn ensure_live(&self) -> Result<()> {
    if self.released.load(Ordering::Acquire) {
      Err(Error::Disposed(self.identifier.to_string()))
    } else {
      Ok(())
    }
  }

  fn notify(&self, key: &str, kind: EventKind, operation: &'static str) {
    for sink in self.sinks.read().iter() {
      if let Err(err) = sink.emit(key, kind, OperationContext::new(operation)) {
        warn!(cache_id = %self.identifier, key, event = %kind, error = %err, "dropped cache event");
      }
    }
  }
}

impl CacheBinding for EmbeddedBinding {
  fn kind(&self) -> BindingKind {
    BindingKind::Embedded
  }

  fn identifier(&self) -> &str {
    &self.identifier
  }

  fn supports(&self, capability: Capability) -> bool {
    matches!(
      capability,
      Capability::DirectStorage | Capability::EventNotifications | Capability::SecondaryHandles
    )
  }

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.ensure_live()?;
    Ok(self.cache.fetch(&key.to_owned()).map(|value| (*value).clone()))
  }

  fn insert(&self, key: &str, value: Vec<u8>) -> Result<()> {
    self.ensure_live()?;
    let key = key.to_owned();
    // Added vs. updated is decided by a peek, so two racing first inserts
    // may both report `Added`.
    let existed = self.cache.peek(&key).is_some();
    self.cache.insert(key.clone(), value, 1);
    let kind = if existed {
      EventKind::Updated
    } else {
      EventKind::Added
    };
    self.notify(&key, kind, "insert");
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<bool> {
    self.ensure_live()?;
    let removed = self.cache.invalidate(&key.to_owned());
    if removed {
      self.notify(key, EventKind::Removed, "remove");
    }
    Ok(removed)
  }

  fn contains(&self, key: &str) -> Result<bool> {
    self.ensure_live()?;
    Ok(self.cache.peek(&key.to_owned()).is_some())
  }

  fn clear(&self) -> Result<()> {
    self.ensure_live()?;
    self.cache.clear();
    Ok(())
  }

  fn register_listener(&self, listener: Arc<dyn CacheEventListener>) -> Result<()> {
    self.ensure_live()?;
    self.sinks.write().push(EventSink::new(
      self.identifier.clone(),
      listener,
      self.dispatcher.clone(),
    ));
    Ok(())
  }

  fn release(&self) -> Result<()> {
    if self.released.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    self.sinks.write().clear();
    self.cache.clear();
    debug!(cache_id = %self.identifier, "embedded engine released");
    Ok(())
  }
}

impl std::fmt::Debug for EmbeddedBinding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EmbeddedBinding")
      .field("identifier", &self.identifier)
      .field("released", &self.released.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}
