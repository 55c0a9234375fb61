use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::binding::CacheBinding;
use crate::codec::{self, Encoding};
use crate::error::{Error, Result};
use crate::listener::CacheEventListener;
use crate::params::{BindingKind, Capability};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
  Primary,
  Secondary,
}

/// Mutable bookkeeping guarded by the handle's own (fine-grained) lock.
///
/// Lock order: the registry's map lock is always taken before this one, and
/// this lock is never held while acquiring the map lock.
#[derive(Debug, Default)]
pub(crate) struct HandleState {
  pub(crate) ref_count: usize,
  pub(crate) secondaries: Vec<CacheHandle>,
}

pub(crate) struct HandleInner {
  identifier: String,
  role: Role,
  binding: Arc<dyn CacheBinding>,
  exceptions_enabled: AtomicBool,
  disposed: AtomicBool,
  pub(crate) state: Mutex<HandleState>,
}

/// A reference-counted connection to a named cache.
///
/// Clones refer to the same logical handle. Handles are obtained from and
/// returned to a [`Registry`](crate::Registry); the registry decides when the
/// bound engine is released.
///
/// When exceptions are disabled on a handle, failing operations are logged
/// and return an empty value instead of an error.
#[derive(Clone)]
pub struct CacheHandle {
  pub(crate) inner: Arc<HandleInner>,
}

impl CacheHandle {
  pub(crate) fn primary(identifier: &str, binding: Arc<dyn CacheBinding>, exceptions: bool) -> Self {
    Self::with_role(identifier, Role::Primary, binding, exceptions)
  }

  pub(crate) fn secondary(primary: &CacheHandle, exceptions: bool) -> Self {
    Self::with_role(
      &primary.inner.identifier,
      Role::Secondary,
      primary.inner.binding.clone(),
      exceptions,
    )
  }

  fn with_role(
    identifier: &str,
    role: Role,
    binding: Arc<dyn CacheBinding>,
    exceptions: bool,
  ) -> Self {
    Self {
      inner: Arc::new(HandleInner {
        identifier: identifier.to_string(),
        role,
        binding,
        exceptions_enabled: AtomicBool::new(exceptions),
        disposed: AtomicBool::new(false),
        state: Mutex::new(HandleState {
          ref_count: 1,
          secondaries: Vec::new(),
        }),
      }),
    }
  }

  // --- Identity & state ---

  pub fn identifier(&self) -> &str {
    &self.inner.identifier
  }

  pub fn kind(&self) -> BindingKind {
    self.inner.binding.kind()
  }

  pub fn is_secondary(&self) -> bool {
    self.inner.role == Role::Secondary
  }

  pub fn ref_count(&self) -> usize {
    self.inner.state.lock().ref_count
  }

  /// Number of secondary handles currently linked to this one.
  pub fn secondary_count(&self) -> usize {
    self.inner.state.lock().secondaries.len()
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.load(Ordering::Acquire)
  }

  /// Whether two values refer to the same handle object.
  pub fn same_handle(&self, other: &CacheHandle) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  /// Whether two handles share one bound engine (a primary and its secondaries).
  pub fn shares_engine_with(&self, other: &CacheHandle) -> bool {
    Arc::ptr_eq(&self.inner.binding, &other.inner.binding)
  }

  pub fn exceptions_enabled(&self) -> bool {
    self.inner.exceptions_enabled.load(Ordering::Acquire)
  }

  pub fn set_exceptions_enabled(&self, enabled: bool) {
    self.inner.exceptions_enabled.store(enabled, Ordering::Release);
  }

  pub fn supports(&self, capability: Capability) -> bool {
    self.inner.binding.supports(capability)
  }

  // --- Reference counting (registry only) ---

  pub(crate) fn binding(&self) -> &Arc<dyn CacheBinding> {
    &self.inner.binding
  }

  pub(crate) fn add_ref(&self) -> usize {
    let mut state = self.inner.state.lock();
    state.ref_count += 1;
    state.ref_count
  }

  /// Decrements the count. `None` if it had already reached zero.
  pub(crate) fn release_ref(&self) -> Option<usize> {
    let mut state = self.inner.state.lock();
    if state.ref_count == 0 {
      return None;
    }
    state.ref_count -= 1;
    Some(state.ref_count)
  }

  /// Drops every outstanding reference at once. Returns the previous count.
  pub(crate) fn force_release(&self) -> usize {
    std::mem::take(&mut self.inner.state.lock().ref_count)
  }

  pub(crate) fn mark_disposed(&self) {
    self.inner.disposed.store(true, Ordering::Release);
  }

  // --- Cache operations ---

  pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.guard("get", self.live().and_then(|b| b.get(key)))
  }

  pub fn insert(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
    self.guard("insert", self.live().and_then(|b| b.insert(key, value.into())))
  }

  /// Returns `true` if the key was present.
  pub fn remove(&self, key: &str) -> Result<bool> {
    self.guard("remove", self.live().and_then(|b| b.remove(key)))
  }

  pub fn contains(&self, key: &str) -> Result<bool> {
    self.guard("contains", self.live().and_then(|b| b.contains(key)))
  }

  pub fn clear(&self) -> Result<()> {
    self.guard("clear", self.live().and_then(|b| b.clear()))
  }

  pub fn register_listener(&self, listener: Arc<dyn CacheEventListener>) -> Result<()> {
    self.guard(
      "register_listener",
      self.live().and_then(|b| b.register_listener(listener)),
    )
  }

  // --- Codec helpers ---

  pub fn insert_text(&self, key: &str, text: &str, encoding: Encoding) -> Result<()> {
    self.insert(key, codec::encode(text, encoding))
  }

  pub fn get_text(&self, key: &str, encoding: Encoding) -> Result<Option<String>> {
    let decoded = self.live().and_then(|b| {
      b.get(key)?
        .map(|bytes| codec::decode(&bytes, encoding))
        .transpose()
        .map_err(Error::from)
    });
    self.guard("get_text", decoded)
  }

  /// Reads a value stored as ASCII decimal text.
  pub fn get_i32(&self, key: &str) -> Result<Option<i32>> {
    let parsed = self.live().and_then(|b| {
      b.get(key)?
        .map(|bytes| codec::parse_i32(&bytes))
        .transpose()
        .map_err(Error::from)
    });
    self.guard("get_i32", parsed)
  }

  fn live(&self) -> Result<&Arc<dyn CacheBinding>> {
    if self.is_disposed() {
      Err(Error::Disposed(self.inner.identifier.clone()))
    } else {
      Ok(&self.inner.binding)
    }
  }

  fn guard<T: Default>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
    match result {
      Err(err) if !self.exceptions_enabled() => {
        warn!(cache_id = %self.inner.identifier, operation, error = %err, "cache operation failed silently");
        Ok(T::default())
      }
      other => other,
    }
  }
}

impl fmt::Debug for CacheHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheHandle")
      .field("identifier", &self.inner.identifier)
      .field("kind", &self.kind())
      .field("role", &self.inner.role)
      .field("disposed", &self.is_disposed())
      .finish_non_exhaustive()
  }
}
