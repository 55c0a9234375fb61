//! The process-wide registry instance and access function.

use crate::registry::Registry;
use once_cell::sync::Lazy;

// Created on first access with default settings.
static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Provides a reference to the process-wide registry.
///
/// Prefer owning a [`Registry`] explicitly; the global instance exists for
/// code that expects a single shared registry. Once shut down it stays shut
/// down for the rest of the process.
///
/// # Examples
///
/// ```
/// use fibre_cache_client::{global, CacheMode, InitParams};
///
/// // Without configuration or a connector, external caches are unavailable.
/// let result = global().acquire("sessions", &InitParams::with_mode(CacheMode::External));
/// assert!(result.is_err());
/// ```
pub fn global() -> &'static Registry {
  &GLOBAL_REGISTRY
}
