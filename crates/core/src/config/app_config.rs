use crate::config::ConfigError;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Where a configuration field got its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    /// Not set; the payload describes the fallback
    Default(String),
    Programmatic,
}

impl ConfigSource {
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "env {}", var),
            ConfigSource::Default(fallback) => write!(f, "default ({})", fallback),
            ConfigSource::Programmatic => write!(f, "set in code"),
        }
    }
}

/// Configuration trait for environment-driven configuration structs
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Read and parse an optional environment variable.
///
/// A missing variable yields `Ok(None)`; a present but unparsable one is an
/// `InvalidValue` error naming `field` and the `expected` form.
pub fn env_parse<T: FromStr>(
    var: &str,
    field: &str,
    expected: &str,
) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(field, raw, expected)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::environment_error(format!(
            "{} is not valid unicode",
            var
        ))),
    }
}

/// Source of a field: the environment variable when it is set, the default otherwise
pub fn env_source(var: &str, default: impl Into<String>) -> ConfigSource {
    if env::var(var).is_ok() {
        ConfigSource::EnvVar(var.to_string())
    } else {
        ConfigSource::Default(default.into())
    }
}
