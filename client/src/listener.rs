use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Added,
  Updated,
  Removed,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventKind::Added => write!(f, "item added"),
      EventKind::Updated => write!(f, "item updated"),
      EventKind::Removed => write!(f, "item removed"),
    }
  }
}

/// Describes the cache operation that caused an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
  pub operation: &'static str,
  /// Optional tag identifying the caller that issued the operation.
  pub caller: Option<String>,
}

impl OperationContext {
  pub fn new(operation: &'static str) -> Self {
    Self {
      operation,
      caller: None,
    }
  }

  pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
    self.caller = Some(caller.into());
    self
  }
}

/// Describes the event itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
  pub cache_id: Arc<str>,
  pub kind: EventKind,
  pub raised_at: SystemTime,
}

impl EventContext {
  pub fn new(cache_id: Arc<str>, kind: EventKind) -> Self {
    Self {
      cache_id,
      kind,
      raised_at: SystemTime::now(),
    }
  }
}

/// A listener that can be registered with a cache handle to receive item
/// notifications.
///
/// Callbacks always run on a dispatcher worker thread, never on the thread
/// that modified the cache. A panicking callback is logged and does not
/// affect later notifications.
pub trait CacheEventListener: Send + Sync {
  fn on_item_updated(&self, key: &str, operation: &OperationContext, event: &EventContext);

  fn on_item_added(&self, _key: &str, _operation: &OperationContext, _event: &EventContext) {}

  fn on_item_removed(&self, _key: &str, _operation: &OperationContext, _event: &EventContext) {}
}

/// One pending listener callback. Consumed exactly once by [`process`](Self::process).
pub struct EventNotification {
  listener: Arc<dyn CacheEventListener>,
  key: String,
  operation: OperationContext,
  event: EventContext,
}

impl EventNotification {
  pub fn new(
    listener: Arc<dyn CacheEventListener>,
    key: impl Into<String>,
    operation: OperationContext,
    event: EventContext,
  ) -> Self {
    Self {
      listener,
      key: key.into(),
      operation,
      event,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn kind(&self) -> EventKind {
    self.event.kind
  }

  /// Invokes the listener callback matching the event kind.
  pub fn process(self) {
    let Self {
      listener,
      key,
      operation,
      event,
    } = self;
    match event.kind {
      EventKind::Added => listener.on_item_added(&key, &operation, &event),
      EventKind::Updated => listener.on_item_updated(&key, &operation, &event),
      EventKind::Removed => listener.on_item_removed(&key, &operation, &event),
    }
  }
}

impl fmt::Debug for EventNotification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EventNotification")
      .field("key", &self.key)
      .field("operation", &self.operation)
      .field("event", &self.event)
      .finish_non_exhaustive()
  }
}
