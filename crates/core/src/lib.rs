//! # tessera-core
//!
//! Foundation shared by the tessera crates: database connection
//! configuration loaded from the environment, configuration validation
//! errors, and the tracing subscriber bootstrap.

pub mod config;
pub mod logging;

pub use config::{
    AppConfigTrait, ConfigError, ConfigSource, ConfigValidator, DatabaseConfig, ErrorPolicy,
    RangeValidator, UrlValidator,
};
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
