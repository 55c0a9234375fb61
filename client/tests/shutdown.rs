mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{collect, RecordingListener, TrackingFactory};
use fibre_cache_client::{
  CacheConfig, EventKind, Error, InitParams, ListenerDispatcher, Registry, StaticConfigSource,
};

fn tracked_registry(factory: &Arc<TrackingFactory>, ids: &[&str]) -> Registry {
  let source = StaticConfigSource::new();
  for id in ids {
    source.insert(CacheConfig::local(*id));
  }
  Registry::builder()
    .config_source(source)
    .binding_factory(factory.clone())
    .dispatcher_lanes(1)
    .build()
    .unwrap()
}

#[test]
fn test_shutdown_continues_past_failures() {
  let factory = TrackingFactory::embedded_only();
  factory.fail_release("b");
  let registry = tracked_registry(&factory, &["a", "b", "c"]);

  let handles: Vec<_> = ["a", "b", "c"]
    .iter()
    .map(|id| registry.acquire(id, &InitParams::default()).unwrap())
    .collect();
  // Outstanding references do not hold teardown back.
  let _extra = registry.acquire("a", &InitParams::default()).unwrap();

  let report = registry.shutdown();
  assert_eq!(report.disposed, 2);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].0, "b");
  assert!(matches!(report.failures[0].1, Error::Engine(_)));

  let mut releases: Vec<String> = factory
    .events()
    .into_iter()
    .filter(|e| e.starts_with("release:"))
    .collect();
  releases.sort();
  assert_eq!(releases, vec!["release:a", "release:b", "release:c"]);

  assert!(handles.iter().all(|h| h.is_disposed()));
  assert!(registry.is_empty());
  assert!(registry.default_handle().is_none());
  assert!(registry.dispatcher().is_stopped());
}

#[test]
fn test_shutdown_runs_once() {
  let factory = TrackingFactory::embedded_only();
  let registry = tracked_registry(&factory, &["a"]);
  registry.acquire("a", &InitParams::default()).unwrap();

  assert_eq!(registry.shutdown().disposed, 1);
  let again = registry.shutdown();
  assert_eq!(again.disposed, 0);
  assert!(again.failures.is_empty());
  assert_eq!(factory.events(), vec!["bind:a", "release:a"]);
}

#[test]
fn test_acquire_after_shutdown_fails() {
  let registry = common::registry_with_configs(&["a"], &[]);
  registry.shutdown();

  assert!(registry.is_shut_down());
  let err = registry.acquire("a", &InitParams::default()).unwrap_err();
  assert!(matches!(err, Error::ShutDown));
}

#[test]
fn test_release_swallows_engine_failures() {
  let factory = TrackingFactory::embedded_only();
  factory.fail_release("a");
  let registry = tracked_registry(&factory, &["a"]);

  let handle = registry.acquire("a", &InitParams::default()).unwrap();
  assert!(registry.release(&handle));
  assert!(!registry.contains("a"));
  assert!(handle.is_disposed());
}

#[test]
fn test_dropping_registry_tears_down_entries() {
  let factory = TrackingFactory::embedded_only();
  let handle = {
    let registry = tracked_registry(&factory, &["a"]);
    registry.acquire("a", &InitParams::default()).unwrap()
  };

  assert!(handle.is_disposed());
  assert_eq!(factory.events(), vec!["bind:a", "release:a"]);
}

#[test]
fn test_shutdown_leaves_a_shared_dispatcher_running() {
  let dispatcher = Arc::new(ListenerDispatcher::new(1));
  let build = |id: &str| {
    Registry::builder()
      .config_source(StaticConfigSource::new().with(CacheConfig::local(id)))
      .dispatcher(dispatcher.clone())
      .build()
      .unwrap()
  };
  let first = build("a");
  let second = build("b");

  first.shutdown();
  assert!(!dispatcher.is_stopped());

  let handle = second.acquire("b", &InitParams::default()).unwrap();
  let (listener, rx) = RecordingListener::new();
  handle.register_listener(listener).unwrap();
  handle.insert("k", b"v".to_vec()).unwrap();
  let event = collect(&rx, 1, Duration::from_secs(2)).remove(0);
  assert_eq!(event.kind, EventKind::Added);
  assert_eq!(event.cache_id, "b");

  second.shutdown();
  assert!(!dispatcher.is_stopped());
  dispatcher.shutdown();
  assert!(dispatcher.is_stopped());
}

#[test]
fn test_shutdown_stops_a_dispatcher_the_registry_spawned() {
  let factory = TrackingFactory::embedded_only();
  let registry = tracked_registry(&factory, &["a"]);
  let dispatcher = registry.dispatcher().clone();

  registry.shutdown();
  assert!(dispatcher.is_stopped());
}
