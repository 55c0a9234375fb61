#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, ThreadId};
use std::time::Duration;

use fibre_cache_client::{
  BindingContext, BindingFactory, BindingKind, CacheBinding, CacheConfig, CacheEventListener, CacheMode,
  Capability, ConnectRequest, Connector, DefaultBindingFactory, Error, EventContext, EventKind, EventSink,
  InitParams, OperationContext, Registry, Result, Session, StaticConfigSource,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Routes library logs to the test output. Filtered by `RUST_LOG`.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Init params whose connection retries don't slow tests down.
pub fn fast_params(mode: CacheMode) -> InitParams {
  InitParams {
    connection_retries: 2,
    retry_interval: Duration::from_millis(1),
    ..InitParams::with_mode(mode)
  }
}

/// A registry with local configurations for `local` and clustered ones for `clustered`.
pub fn registry_with_configs(local: &[&str], clustered: &[&str]) -> Registry {
  init_tracing();
  let source = StaticConfigSource::new();
  for id in local {
    source.insert(CacheConfig::local(*id));
  }
  for id in clustered {
    source.insert(CacheConfig::clustered(*id));
  }
  Registry::builder()
    .config_source(source)
    .dispatcher_lanes(2)
    .build()
    .unwrap()
}

// --- Loopback external service ---

/// An in-memory stand-in for an external cache service.
#[derive(Default)]
pub struct LoopbackServer {
  data: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
  failures_left: AtomicU32,
  attempts: AtomicU32,
  closed: AtomicU32,
  capabilities: Mutex<HashSet<Capability>>,
}

impl LoopbackServer {
  pub fn new() -> Arc<Self> {
    let server = Self::default();
    server
      .capabilities
      .lock()
      .insert(Capability::EventNotifications);
    Arc::new(server)
  }

  /// The next `count` connection attempts fail.
  pub fn fail_next(&self, count: u32) {
    self.failures_left.store(count, Ordering::SeqCst);
  }

  pub fn offer(&self, capability: Capability) {
    self.capabilities.lock().insert(capability);
  }

  pub fn withdraw(&self, capability: Capability) {
    self.capabilities.lock().remove(&capability);
  }

  pub fn attempts(&self) -> u32 {
    self.attempts.load(Ordering::SeqCst)
  }

  pub fn closed_sessions(&self) -> u32 {
    self.closed.load(Ordering::SeqCst)
  }

  pub fn stored(&self, cache_id: &str, key: &str) -> Option<Vec<u8>> {
    self
      .data
      .lock()
      .get(cache_id)
      .and_then(|items| items.get(key).cloned())
  }
}

#[derive(Clone)]
pub struct LoopbackConnector {
  pub server: Arc<LoopbackServer>,
}

impl LoopbackConnector {
  pub fn new(server: Arc<LoopbackServer>) -> Self {
    Self { server }
  }
}

impl Connector for LoopbackConnector {
  fn connect(&self, request: &ConnectRequest<'_>) -> Result<Box<dyn Session>> {
    self.server.attempts.fetch_add(1, Ordering::SeqCst);
    let refused = self
      .server
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
      .is_ok();
    if refused {
      return Err(Error::Engine(format!(
        "connection to {}:{} refused",
        request.server(),
        request.port()
      )));
    }
    Ok(Box::new(LoopbackSession {
      cache_id: request.identifier.to_string(),
      server: self.server.clone(),
      sinks: Mutex::new(Vec::new()),
    }))
  }
}

struct LoopbackSession {
  cache_id: String,
  server: Arc<LoopbackServer>,
  sinks: Mutex<Vec<EventSink>>,
}

impl LoopbackSession {
  fn publish(&self, key: &str, kind: EventKind, operation: &'static str) {
    for sink in self.sinks.lock().iter() {
      let _ = sink.emit(key, kind, OperationContext::new(operation).with_caller("loopback"));
    }
  }
}

impl Session for LoopbackSession {
  fn supports(&self, capability: Capability) -> bool {
    self.server.capabilities.lock().contains(&capability)
  }

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    Ok(self.server.stored(&self.cache_id, key))
  }

  fn insert(&self, key: &str, value: &[u8]) -> Result<()> {
    let previous = self
      .server
      .data
      .lock()
      .entry(self.cache_id.clone())
      .or_default()
      .insert(key.to_string(), value.to_vec());
    let kind = if previous.is_some() {
      EventKind::Updated
    } else {
      EventKind::Added
    };
    self.publish(key, kind, "insert");
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<bool> {
    let removed = self
      .server
      .data
      .lock()
      .get_mut(&self.cache_id)
      .and_then(|items| items.remove(key))
      .is_some();
    if removed {
      self.publish(key, EventKind::Removed, "remove");
    }
    Ok(removed)
  }

  fn clear(&self) -> Result<()> {
    self.server.data.lock().remove(&self.cache_id);
    Ok(())
  }

  fn subscribe(&self, sink: EventSink) -> Result<()> {
    self.sinks.lock().push(sink);
    Ok(())
  }

  fn close(&self) -> Result<()> {
    self.sinks.lock().clear();
    self.server.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

// --- Binding factory that records what it builds and releases ---

/// Wraps the default factory, logging `bind:<id>` and `release:<id>`.
pub struct TrackingFactory {
  inner: DefaultBindingFactory,
  pub log: Arc<Mutex<Vec<String>>>,
  failing_release: Mutex<HashSet<String>>,
  binds: AtomicUsize,
}

impl TrackingFactory {
  pub fn new(inner: DefaultBindingFactory) -> Arc<Self> {
    Arc::new(Self {
      inner,
      log: Arc::new(Mutex::new(Vec::new())),
      failing_release: Mutex::new(HashSet::new()),
      binds: AtomicUsize::new(0),
    })
  }

  pub fn embedded_only() -> Arc<Self> {
    Self::new(DefaultBindingFactory::embedded_only())
  }

  /// Releasing `identifier`'s engine will report an error.
  pub fn fail_release(&self, identifier: &str) {
    self.failing_release.lock().insert(identifier.to_string());
  }

  pub fn binds(&self) -> usize {
    self.binds.load(Ordering::SeqCst)
  }

  pub fn events(&self) -> Vec<String> {
    self.log.lock().clone()
  }

  fn track(&self, binding: Arc<dyn CacheBinding>) -> Arc<dyn CacheBinding> {
    let id = binding.identifier().to_string();
    self.binds.fetch_add(1, Ordering::SeqCst);
    self.log.lock().push(format!("bind:{id}"));
    let fail_release = self.failing_release.lock().contains(&id);
    Arc::new(TrackedBinding {
      inner: binding,
      log: self.log.clone(),
      fail_release,
    })
  }
}

impl BindingFactory for TrackingFactory {
  fn embedded(&self, config: &CacheConfig, ctx: &BindingContext) -> Result<Arc<dyn CacheBinding>> {
    Ok(self.track(self.inner.embedded(config, ctx)?))
  }

  fn external(&self, identifier: &str, params: &InitParams, ctx: &BindingContext) -> Result<Arc<dyn CacheBinding>> {
    Ok(self.track(self.inner.external(identifier, params, ctx)?))
  }
}

struct TrackedBinding {
  inner: Arc<dyn CacheBinding>,
  log: Arc<Mutex<Vec<String>>>,
  fail_release: bool,
}

impl CacheBinding for TrackedBinding {
  fn kind(&self) -> BindingKind {
    self.inner.kind()
  }

  fn identifier(&self) -> &str {
    self.inner.identifier()
  }

  fn supports(&self, capability: Capability) -> bool {
    self.inner.supports(capability)
  }

  fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    self.inner.get(key)
  }

  fn insert(&self, key: &str, value: Vec<u8>) -> Result<()> {
    self.inner.insert(key, value)
  }

  fn remove(&self, key: &str) -> Result<bool> {
    self.inner.remove(key)
  }

  fn contains(&self, key: &str) -> Result<bool> {
    self.inner.contains(key)
  }

  fn clear(&self) -> Result<()> {
    self.inner.clear()
  }

  fn register_listener(&self, listener: Arc<dyn CacheEventListener>) -> Result<()> {
    self.inner.register_listener(listener)
  }

  fn release(&self) -> Result<()> {
    self.log.lock().push(format!("release:{}", self.identifier()));
    self.inner.release()?;
    if self.fail_release {
      return Err(Error::Engine(format!("engine '{}' refused to stop", self.identifier())));
    }
    Ok(())
  }
}

// --- Listeners ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
  pub cache_id: String,
  pub key: String,
  pub kind: EventKind,
  pub thread: ThreadId,
}

/// Forwards every callback to a channel, tagged with the calling thread.
pub struct RecordingListener {
  sender: mpsc::Sender<Recorded>,
}

impl RecordingListener {
  pub fn new() -> (Arc<Self>, mpsc::Receiver<Recorded>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(Self { sender: tx }), rx)
  }

  fn record(&self, key: &str, event: &EventContext) {
    let _ = self.sender.send(Recorded {
      cache_id: event.cache_id.to_string(),
      key: key.to_string(),
      kind: event.kind,
      thread: thread::current().id(),
    });
  }
}

impl CacheEventListener for RecordingListener {
  fn on_item_updated(&self, key: &str, _operation: &OperationContext, event: &EventContext) {
    self.record(key, event);
  }

  fn on_item_added(&self, key: &str, _operation: &OperationContext, event: &EventContext) {
    self.record(key, event);
  }

  fn on_item_removed(&self, key: &str, _operation: &OperationContext, event: &EventContext) {
    self.record(key, event);
  }
}

/// Drains `count` events or panics after `timeout`.
pub fn collect(rx: &mpsc::Receiver<Recorded>, count: usize, timeout: Duration) -> Vec<Recorded> {
  (0..count)
    .map(|i| {
      rx.recv_timeout(timeout)
        .unwrap_or_else(|_| panic!("timed out waiting for event {} of {count}", i + 1))
    })
    .collect()
}
