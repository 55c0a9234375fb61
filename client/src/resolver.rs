use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{CacheConfig, ConfigSource};
use crate::error::{ConfigError, Result};
use crate::params::{BindingKind, CacheMode};
use crate::retry::RetryPolicy;

/// The outcome of mode resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub kind: BindingKind,
  /// The configuration that was found, if a lookup ran and succeeded.
  pub config: Option<CacheConfig>,
}

impl Resolution {
  fn external(config: Option<CacheConfig>) -> Self {
    Self {
      kind: BindingKind::External,
      config,
    }
  }
}

/// Decides whether an identifier is served embedded or external.
pub struct ModeResolver {
  source: Arc<dyn ConfigSource>,
  retry: RetryPolicy,
}

impl ModeResolver {
  pub fn new(source: Arc<dyn ConfigSource>, retry: RetryPolicy) -> Self {
    Self { source, retry }
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry
  }

  /// Resolves `requested` for `identifier`.
  ///
  /// - `External` never consults configuration.
  /// - A failed lookup falls back to `External` for `Automatic` and is
  ///   returned as-is for `Embedded`.
  /// - A clustered topology is rejected for anything but `External`.
  /// - Otherwise `Embedded` stays embedded and `Automatic` follows the
  ///   configuration's `in_proc` preference.
  pub fn resolve(&self, identifier: &str, requested: CacheMode) -> Result<Resolution> {
    if requested == CacheMode::External {
      debug!(cache_id = identifier, "external mode requested, skipping configuration lookup");
      return Ok(Resolution::external(None));
    }

    let lookup = self.retry.run(
      |attempt| {
        debug!(cache_id = identifier, attempt, "looking up cache configuration");
        self.source.load(identifier)
      },
      ConfigError::is_transient,
    );

    let config = match lookup {
      Ok(config) => config,
      Err(err) if requested == CacheMode::Automatic => {
        info!(
          cache_id = identifier,
          error = %err,
          "no usable configuration, falling back to external mode"
        );
        return Ok(Resolution::external(None));
      }
      Err(err) => return Err(err.into()),
    };

    if config.is_clustered() {
      return Err(ConfigError::ClusteredEmbedded(identifier.to_string()).into());
    }

    let kind = match requested {
      CacheMode::Embedded => BindingKind::Embedded,
      _ if config.in_proc => BindingKind::Embedded,
      _ => BindingKind::External,
    };
    debug!(cache_id = identifier, mode = %requested, resolved = %kind, "mode resolved");
    Ok(Resolution {
      kind,
      config: Some(config),
    })
  }
}

impl std::fmt::Debug for ModeResolver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModeResolver")
      .field("retry", &self.retry)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::StaticConfigSource;
  use crate::error::Error;
  use std::path::PathBuf;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  /// Fails with a read error a fixed number of times before delegating.
  struct Flaky {
    failures_left: AtomicU32,
    calls: AtomicU32,
    inner: StaticConfigSource,
  }

  impl ConfigSource for Flaky {
    fn load(&self, identifier: &str) -> std::result::Result<CacheConfig, ConfigError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let left = self.failures_left.load(Ordering::SeqCst);
      if left > 0 {
        self.failures_left.store(left - 1, Ordering::SeqCst);
        return Err(ConfigError::Read {
          path: PathBuf::from(format!("{identifier}.yaml")),
          source: std::io::Error::new(std::io::ErrorKind::Other, "disk busy"),
        });
      }
      self.inner.load(identifier)
    }
  }

  fn resolver(source: impl ConfigSource + 'static, attempts: u32) -> ModeResolver {
    ModeResolver::new(
      Arc::new(source),
      RetryPolicy::fixed(attempts, Duration::from_millis(1)),
    )
  }

  #[test]
  fn external_skips_lookup() {
    let flaky = Arc::new(Flaky {
      failures_left: AtomicU32::new(0),
      calls: AtomicU32::new(0),
      inner: StaticConfigSource::new(),
    });
    let resolver = ModeResolver::new(flaky.clone(), RetryPolicy::default());
    let resolution = resolver.resolve("orders", CacheMode::External).unwrap();
    assert_eq!(resolution, Resolution::external(None));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn transient_lookup_failures_are_retried() {
    let flaky = Flaky {
      failures_left: AtomicU32::new(2),
      calls: AtomicU32::new(0),
      inner: StaticConfigSource::new().with(CacheConfig::local("orders")),
    };
    let resolution = resolver(flaky, 3).resolve("orders", CacheMode::Embedded).unwrap();
    assert_eq!(resolution.kind, BindingKind::Embedded);
  }

  #[test]
  fn exhausted_retries_fall_back_only_for_automatic() {
    let make = || Flaky {
      failures_left: AtomicU32::new(10),
      calls: AtomicU32::new(0),
      inner: StaticConfigSource::new().with(CacheConfig::local("orders")),
    };
    let resolution = resolver(make(), 2).resolve("orders", CacheMode::Automatic).unwrap();
    assert_eq!(resolution.kind, BindingKind::External);

    let err = resolver(make(), 2).resolve("orders", CacheMode::Embedded).unwrap_err();
    assert!(matches!(err, Error::Configuration(ConfigError::Read { .. })));
  }

  #[test]
  fn not_found_is_not_retried() {
    let flaky = Arc::new(Flaky {
      failures_left: AtomicU32::new(0),
      calls: AtomicU32::new(0),
      inner: StaticConfigSource::new(),
    });
    let resolver = ModeResolver::new(flaky.clone(), RetryPolicy::fixed(5, Duration::from_millis(1)));
    let err = resolver.resolve("orders", CacheMode::Embedded).unwrap_err();
    assert!(matches!(err, Error::Configuration(ConfigError::NotFound(ref id)) if id == "orders"));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn automatic_follows_in_proc_preference() {
    let out_of_proc = CacheConfig {
      in_proc: false,
      ..CacheConfig::local("reports")
    };
    let source = StaticConfigSource::new()
      .with(out_of_proc)
      .with(CacheConfig::local("orders"));
    let resolver = resolver(source, 1);

    assert_eq!(
      resolver.resolve("reports", CacheMode::Automatic).unwrap().kind,
      BindingKind::External
    );
    assert_eq!(
      resolver.resolve("reports", CacheMode::Embedded).unwrap().kind,
      BindingKind::Embedded
    );
    assert_eq!(
      resolver.resolve("orders", CacheMode::Automatic).unwrap().kind,
      BindingKind::Embedded
    );
  }
}
