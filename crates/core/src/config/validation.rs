use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Environment variable error: {message}")]
    EnvironmentError { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an environment error
    pub fn environment_error(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Database URL validator
pub struct UrlValidator {
    pub field: &'static str,
    pub schemes: Vec<String>,
    pub require_host: bool,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self {
            field: "url",
            schemes: vec!["mysql".to_string(), "mariadb".to_string()],
            require_host: true,
        }
    }
}

impl ConfigValidator<str> for UrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::invalid_value(self.field, value, "non-empty URL"));
        }

        let parsed = url::Url::parse(value).map_err(|e| {
            ConfigError::invalid_value(self.field, value, format!("parsable URL ({})", e))
        })?;

        if !self.schemes.iter().any(|scheme| scheme == parsed.scheme()) {
            return Err(ConfigError::invalid_value(
                self.field,
                value,
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        if self.require_host && parsed.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid_value(self.field, value, "URL with host"));
        }

        Ok(())
    }
}

/// Inclusive numeric range validator
pub struct RangeValidator {
    pub field: &'static str,
    pub min: u64,
    pub max: u64,
}

impl ConfigValidator<u64> for RangeValidator {
    fn validate(&self, value: &u64) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                self.field,
                value.to_string(),
                format!("value between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validator_accepts_mysql_urls() {
        let validator = UrlValidator::default();
        assert!(validator.validate("mysql://localhost:3306/app").is_ok());
        assert!(validator.validate("mariadb://db.internal/app").is_ok());
    }

    #[test]
    fn test_url_validator_rejects_other_schemes() {
        let validator = UrlValidator::default();
        let err = validator.validate("postgres://localhost/app").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(validator.validate("").is_err());
        assert!(validator.validate("not a url").is_err());
    }

    #[test]
    fn test_range_validator() {
        let validator = RangeValidator {
            field: "max_connections",
            min: 1,
            max: 10,
        };
        assert!(validator.validate(&1).is_ok());
        assert!(validator.validate(&10).is_ok());
        assert!(validator.validate(&0).is_err());
        assert!(validator.validate(&11).is_err());
    }
}
