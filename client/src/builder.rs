use std::path::PathBuf;
use std::sync::Arc;

use crate::binding::{BindingFactory, Connector, DefaultBindingFactory, UnavailableConnector};
use crate::config::{ConfigSource, RegistrySettings, StaticConfigSource, YamlDirectory};
use crate::error::Result;
use crate::registry::Registry;
use crate::resolver::ModeResolver;
use crate::retry::RetryPolicy;
use crate::task::dispatcher::ListenerDispatcher;

/// A builder for [`Registry`] instances.
///
/// Configuration comes from, in order of precedence: an explicit
/// [`config_source`](Self::config_source), the settings' config directory,
/// or an empty source. Bindings come from an explicit
/// [`binding_factory`](Self::binding_factory), or a [`DefaultBindingFactory`]
/// around the configured [`connector`](Self::connector).
pub struct RegistryBuilder {
  settings: RegistrySettings,
  config_source: Option<Arc<dyn ConfigSource>>,
  connector: Option<Arc<dyn Connector>>,
  factory: Option<Arc<dyn BindingFactory>>,
  dispatcher: Option<Arc<ListenerDispatcher>>,
}

impl RegistryBuilder {
  pub fn new() -> Self {
    Self::from_settings(RegistrySettings::default())
  }

  pub fn from_settings(settings: RegistrySettings) -> Self {
    Self {
      settings,
      config_source: None,
      connector: None,
      factory: None,
      dispatcher: None,
    }
  }

  pub fn config_source<S>(mut self, source: S) -> Self
  where
    S: ConfigSource + 'static,
  {
    self.config_source = Some(Arc::new(source));
    self
  }

  pub fn shared_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
    self.config_source = Some(source);
    self
  }

  /// Reads cache configuration from `<directory>/<identifier>.yaml`.
  pub fn config_directory(mut self, directory: impl Into<PathBuf>) -> Self {
    self.settings.config_directory = Some(directory.into());
    self
  }

  pub fn connector<C>(mut self, connector: C) -> Self
  where
    C: Connector + 'static,
  {
    self.connector = Some(Arc::new(connector));
    self
  }

  pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
    self.connector = Some(connector);
    self
  }

  /// Replaces the default binding factory entirely. A connector set on the
  /// builder is then ignored.
  pub fn binding_factory(mut self, factory: Arc<dyn BindingFactory>) -> Self {
    self.factory = Some(factory);
    self
  }

  /// Uses an existing dispatcher instead of spawning one. The registry never
  /// stops a dispatcher it was given; its owner does.
  pub fn dispatcher(mut self, dispatcher: Arc<ListenerDispatcher>) -> Self {
    self.dispatcher = Some(dispatcher);
    self
  }

  pub fn exceptions_enabled(mut self, enabled: bool) -> Self {
    self.settings.exceptions_enabled = enabled;
    self
  }

  pub fn dispatcher_lanes(mut self, lanes: usize) -> Self {
    self.settings.dispatcher_lanes = Some(lanes);
    self
  }

  /// Bounds every dispatcher lane. Once a lane is full, further events for
  /// its keys are dropped and logged, so leave this unset unless losing
  /// events under load is acceptable.
  pub fn lane_capacity(mut self, capacity: usize) -> Self {
    self.settings.lane_capacity = Some(capacity);
    self
  }

  pub fn lookup_retry(mut self, policy: RetryPolicy) -> Self {
    self.settings.lookup_retry = policy;
    self
  }

  /// Validates the settings and builds the registry.
  pub fn build(self) -> Result<Registry> {
    self.settings.validate()?;
    Ok(self.assemble())
  }

  pub(crate) fn assemble(self) -> Registry {
    let settings = self.settings;

    let source: Arc<dyn ConfigSource> = match (self.config_source, &settings.config_directory) {
      (Some(source), _) => source,
      (None, Some(directory)) => Arc::new(YamlDirectory::new(directory.clone())),
      (None, None) => Arc::new(StaticConfigSource::new()),
    };

    let factory: Arc<dyn BindingFactory> = match self.factory {
      Some(factory) => factory,
      None => {
        let connector: Arc<dyn Connector> = match self.connector {
          Some(connector) => connector,
          None => Arc::new(UnavailableConnector),
        };
        Arc::new(DefaultBindingFactory::new(connector))
      }
    };

    let (dispatcher, owns_dispatcher) = match self.dispatcher {
      Some(shared) => (shared, false),
      None => {
        let lanes = settings.dispatcher_lanes.unwrap_or_else(num_cpus::get);
        (
          Arc::new(ListenerDispatcher::spawn(lanes, settings.lane_capacity)),
          true,
        )
      }
    };

    Registry::from_parts(
      ModeResolver::new(source, settings.lookup_retry),
      factory,
      dispatcher,
      owns_dispatcher,
      settings.exceptions_enabled,
    )
  }
}

impl Default for RegistryBuilder {
  fn default() -> Self {
    Self::new()
  }
}
