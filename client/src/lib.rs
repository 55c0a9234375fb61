//! Client-side access to named, shared cache connections.
//!
//! A [`Registry`] hands out reference-counted [`CacheHandle`]s by cache
//! identifier. The first request for an identifier decides how it is realized:
//!
//! - **Embedded**: a `fibre_cache` engine running inside this process.
//! - **External**: a session with a separately running cache service, opened
//!   through a user-supplied [`Connector`].
//!
//! Every further request for the same identifier shares that handle. Item
//! events raised by an engine are delivered to listeners on background
//! dispatcher threads, never on the thread that changed the cache.
//!
//! # Features
//! - **Mode Resolution**: `Automatic`, `Embedded` and `External` requests,
//!   driven by per-cache YAML configuration, with bounded retry and fallback.
//! - **Shared Handles**: one engine per identifier, released when the last
//!   reference is given back.
//! - **Secondary Handles**: extra handle objects over one embedded engine,
//!   each with its own settings.
//! - **Listener Dispatch**: per-key FIFO callbacks with panic isolation.
//!
//! # Quick Start
//!
//! ```
//! use fibre_cache_client::{CacheConfig, CacheMode, InitParams, Registry, StaticConfigSource};
//!
//! let registry = Registry::builder()
//!   .config_source(StaticConfigSource::new().with(CacheConfig::local("orders")))
//!   .build()
//!   .unwrap();
//!
//! let orders = registry.acquire("orders", &InitParams::with_mode(CacheMode::Embedded)).unwrap();
//! orders.insert("order:1", b"pending".to_vec()).unwrap();
//! assert_eq!(orders.get("order:1").unwrap(), Some(b"pending".to_vec()));
//!
//! // A second caller shares the same handle.
//! let again = registry.acquire("orders", &InitParams::default()).unwrap();
//! assert!(again.same_handle(&orders));
//!
//! registry.release(&again);
//! assert!(registry.release(&orders)); // the last release frees the engine
//! registry.shutdown();
//! ```

// Public modules that form the API
pub mod binding;
pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod listener;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod retry;

// Internal, crate-only modules
mod global;
mod task;

// Re-export the primary user-facing types for convenience
pub use binding::{
  BindingContext, BindingFactory, CacheBinding, ConnectRequest, Connector, DefaultBindingFactory,
  EventSink, Session,
};
pub use builder::RegistryBuilder;
pub use codec::Encoding;
pub use config::{CacheConfig, ConfigSource, RegistrySettings, StaticConfigSource, Topology, YamlDirectory};
pub use error::{ConfigError, DispatchError, Error, FormatError, Result};
pub use global::global;
pub use handle::CacheHandle;
pub use listener::{CacheEventListener, EventContext, EventKind, EventNotification, OperationContext};
pub use params::{BindingKind, CacheMode, Capability, Credentials, InitParams};
pub use registry::{Registry, ShutdownReport};
pub use resolver::{ModeResolver, Resolution};
pub use retry::RetryPolicy;
pub use task::dispatcher::{DispatchStats, ListenerDispatcher};
