use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::binding::{BindingContext, BindingFactory};
use crate::builder::RegistryBuilder;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::handle::CacheHandle;
use crate::params::{BindingKind, Capability, InitParams};
use crate::resolver::ModeResolver;
use crate::task::dispatcher::ListenerDispatcher;

/// State guarded by the registry's coarse lock.
#[derive(Default)]
struct RegistryState {
  entries: HashMap<String, CacheHandle>,
  /// The first handle created, kept while it stays registered.
  default_handle: Option<CacheHandle>,
}

/// What [`Registry::shutdown`] managed to clean up.
#[derive(Debug, Default)]
pub struct ShutdownReport {
  pub disposed: usize,
  /// Identifiers whose engine failed to release, with the error.
  pub failures: Vec<(String, Error)>,
}

/// Maps cache identifiers to shared, reference-counted handles.
///
/// # Locking
///
/// Two levels: a coarse lock over the identifier map and the default handle,
/// and a fine lock inside each handle over its reference count and secondary
/// list. The coarse lock is always taken first. It is held across the
/// existence check, mode resolution, binding construction and insert for a
/// new identifier, so concurrent callers never build two engines for it.
/// Engines are released after every lock has been dropped.
pub struct Registry {
  state: Mutex<RegistryState>,
  exceptions_enabled: AtomicBool,
  resolver: ModeResolver,
  factory: Arc<dyn BindingFactory>,
  dispatcher: Arc<ListenerDispatcher>,
  // False when the dispatcher was supplied by the caller.
  owns_dispatcher: bool,
  shut_down: AtomicBool,
}

impl Registry {
  /// A registry with default settings: no configuration (every `Automatic`
  /// request resolves external) and no connector.
  pub fn new() -> Self {
    RegistryBuilder::new().assemble()
  }

  pub fn builder() -> RegistryBuilder {
    RegistryBuilder::new()
  }

  pub(crate) fn from_parts(
    resolver: ModeResolver,
    factory: Arc<dyn BindingFactory>,
    dispatcher: Arc<ListenerDispatcher>,
    owns_dispatcher: bool,
    exceptions_enabled: bool,
  ) -> Self {
    Self {
      state: Mutex::new(RegistryState::default()),
      exceptions_enabled: AtomicBool::new(exceptions_enabled),
      resolver,
      factory,
      dispatcher,
      owns_dispatcher,
      shut_down: AtomicBool::new(false),
    }
  }

  /// Returns the handle for `identifier`, creating and binding it on first use.
  ///
  /// Every successful call must be matched by one [`release`](Self::release).
  pub fn acquire(&self, identifier: &str, params: &InitParams) -> Result<CacheHandle> {
    validate_identifier(identifier)?;

    let mut state = self.state.lock();
    if self.is_shut_down() {
      return Err(Error::ShutDown);
    }

    if let Some(existing) = state.entries.get(identifier) {
      let ref_count = existing.add_ref();
      debug!(cache_id = identifier, ref_count, "reusing registered cache handle");
      return Ok(existing.clone());
    }

    let resolution = self.resolver.resolve(identifier, params.mode)?;
    let ctx = BindingContext::new(self.dispatcher.clone());
    let binding = match resolution.kind {
      BindingKind::Embedded => {
        let config = resolution
          .config
          .unwrap_or_else(|| CacheConfig::local(identifier));
        self.factory.embedded(&config, &ctx)?
      }
      BindingKind::External => self.factory.external(identifier, params, &ctx)?,
    };

    let handle = CacheHandle::primary(
      identifier,
      binding,
      self.exceptions_enabled.load(Ordering::Acquire),
    );
    state
      .entries
      .insert(identifier.to_string(), handle.clone());
    if state.default_handle.is_none() {
      debug!(cache_id = identifier, "installed as default cache handle");
      state.default_handle = Some(handle.clone());
    }

    info!(cache_id = identifier, mode = %params.mode, resolved = %resolution.kind, "cache handle created");
    Ok(handle)
  }

  /// Creates an additional handle object sharing `primary`'s embedded engine.
  ///
  /// The secondary carries its own settings (such as the exceptions flag) and
  /// must be released on its own. Releasing it never releases the engine;
  /// that happens when the primary's count reaches zero, after which any
  /// remaining secondary reports [`Error::Disposed`].
  pub fn acquire_secondary(&self, primary: &CacheHandle) -> Result<CacheHandle> {
    if primary.is_secondary() {
      return Err(Error::InvalidArgument(
        "secondary handles can only be created from a primary handle".to_string(),
      ));
    }
    if !primary.supports(Capability::SecondaryHandles) {
      return Err(Error::CapabilityUnsupported {
        capability: Capability::SecondaryHandles,
        binding: primary.kind(),
      });
    }

    let _state = self.state.lock();
    if self.is_shut_down() {
      return Err(Error::ShutDown);
    }
    let mut primary_state = primary.inner.state.lock();
    if primary.is_disposed() || primary_state.ref_count == 0 {
      return Err(Error::Disposed(primary.identifier().to_string()));
    }
    let secondary = CacheHandle::secondary(primary, self.exceptions_enabled.load(Ordering::Acquire));
    primary_state.secondaries.push(secondary.clone());
    debug!(
      cache_id = primary.identifier(),
      secondaries = primary_state.secondaries.len(),
      "secondary cache handle created"
    );
    Ok(secondary)
  }

  /// Gives back one reference. Returns `true` if this call released the
  /// bound engine. Releasing an already fully released handle does nothing.
  pub fn release(&self, handle: &CacheHandle) -> bool {
    if handle.is_secondary() {
      self.release_secondary(handle);
      return false;
    }

    {
      let mut state = self.state.lock();
      let remaining = match handle.release_ref() {
        Some(remaining) => remaining,
        None => return false,
      };
      if remaining > 0 {
        debug!(cache_id = handle.identifier(), ref_count = remaining, "cache handle released");
        return false;
      }
      let registered = state
        .entries
        .get(handle.identifier())
        .is_some_and(|entry| entry.same_handle(handle));
      if registered {
        state.entries.remove(handle.identifier());
      }
      if state
        .default_handle
        .as_ref()
        .is_some_and(|default| default.same_handle(handle))
      {
        state.default_handle = None;
      }
    }

    if let Err(err) = dispose(handle) {
      warn!(cache_id = handle.identifier(), error = %err, "failed to release cache engine");
    }
    info!(cache_id = handle.identifier(), "cache handle disposed");
    true
  }

  fn release_secondary(&self, secondary: &CacheHandle) {
    // Secondaries hold no map entry, so only the primary's fine lock is needed.
    let primary = self
      .state
      .lock()
      .entries
      .get(secondary.identifier())
      .cloned();
    if let Some(primary) = primary {
      primary
        .inner
        .state
        .lock()
        .secondaries
        .retain(|linked| !linked.same_handle(secondary));
    }
    if secondary.release_ref() == Some(0) {
      secondary.mark_disposed();
      debug!(cache_id = secondary.identifier(), "secondary cache handle released");
    }
  }

  // --- Lookup ---

  /// The registered handle for `identifier`, without taking a reference.
  pub fn get(&self, identifier: &str) -> Option<CacheHandle> {
    self.state.lock().entries.get(identifier).cloned()
  }

  pub fn contains(&self, identifier: &str) -> bool {
    self.state.lock().entries.contains_key(identifier)
  }

  pub fn len(&self) -> usize {
    self.state.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn identifiers(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.state.lock().entries.keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Current reference count for `identifier`, or 0 if it is not registered.
  pub fn ref_count(&self, identifier: &str) -> usize {
    self
      .state
      .lock()
      .entries
      .get(identifier)
      .map_or(0, CacheHandle::ref_count)
  }

  /// The first handle created by this registry, while it is still registered.
  pub fn default_handle(&self) -> Option<CacheHandle> {
    self.state.lock().default_handle.clone()
  }

  pub fn dispatcher(&self) -> &Arc<ListenerDispatcher> {
    &self.dispatcher
  }

  // --- Exceptions flag ---

  /// Reflects the default handle's flag when there is one.
  pub fn exceptions_enabled(&self) -> bool {
    let state = self.state.lock();
    match &state.default_handle {
      Some(default) => {
        let enabled = default.exceptions_enabled();
        self.exceptions_enabled.store(enabled, Ordering::Release);
        enabled
      }
      None => self.exceptions_enabled.load(Ordering::Acquire),
    }
  }

  /// Sets the flag inherited by new handles and applies it to the default handle.
  pub fn set_exceptions_enabled(&self, enabled: bool) {
    let state = self.state.lock();
    self.exceptions_enabled.store(enabled, Ordering::Release);
    if let Some(default) = &state.default_handle {
      default.set_exceptions_enabled(enabled);
    }
  }

  // --- Lifecycle ---

  pub fn is_shut_down(&self) -> bool {
    self.shut_down.load(Ordering::Acquire)
  }

  /// Disposes every registered handle and stops the dispatcher if this
  /// registry spawned it.
  ///
  /// Failures are logged and collected; teardown always visits every entry.
  /// Only the first call does any work.
  pub fn shutdown(&self) -> ShutdownReport {
    let handles: Vec<CacheHandle> = {
      let mut state = self.state.lock();
      if self.shut_down.swap(true, Ordering::AcqRel) {
        return ShutdownReport::default();
      }
      state.default_handle = None;
      state.entries.drain().map(|(_, handle)| handle).collect()
    };

    let mut report = ShutdownReport::default();
    for handle in handles {
      let outstanding = handle.force_release();
      match dispose(&handle) {
        Ok(()) => {
          debug!(cache_id = handle.identifier(), outstanding, "disposed cache handle at shutdown");
          report.disposed += 1;
        }
        Err(err) => {
          warn!(cache_id = handle.identifier(), error = %err, "failed to dispose cache handle at shutdown");
          report.failures.push((handle.identifier().to_string(), err));
        }
      }
    }

    if self.owns_dispatcher {
      self.dispatcher.shutdown();
    }
    info!(
      disposed = report.disposed,
      failed = report.failures.len(),
      "cache registry shut down"
    );
    report
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Registry {
  fn drop(&mut self) {
    if !self.is_shut_down() {
      self.shutdown();
    }
  }
}

impl std::fmt::Debug for Registry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registry")
      .field("identifiers", &self.identifiers())
      .field("shut_down", &self.is_shut_down())
      .field("resolver", &self.resolver)
      .finish_non_exhaustive()
  }
}

fn validate_identifier(identifier: &str) -> Result<()> {
  if identifier.trim().is_empty() {
    return Err(Error::InvalidArgument(
      "cache identifier cannot be empty".to_string(),
    ));
  }
  Ok(())
}

/// Marks the handle and its secondaries disposed, then releases the engine.
fn dispose(handle: &CacheHandle) -> Result<()> {
  handle.mark_disposed();
  let secondaries = std::mem::take(&mut handle.inner.state.lock().secondaries);
  for secondary in &secondaries {
    secondary.force_release();
    secondary.mark_disposed();
  }
  handle.binding().release()
}
