//! Cache configuration: per-identifier topology metadata, the sources it is
//! loaded from, and the registry's own settings.

pub mod raw;
mod processed;
mod source;

pub use processed::{CacheConfig, RegistrySettings, Topology};
pub use source::{ConfigSource, StaticConfigSource, YamlDirectory};
