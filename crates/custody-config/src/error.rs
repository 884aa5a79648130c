//! Configuration error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the config shape.
    #[error("Could not load custody configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A field parsed but holds a value the store or retention engine rejects.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The dotted config key at fault, when one is known.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Figment(e) => e.path.last().map(String::as_str),
            Self::InvalidValue { field, .. } => Some(field),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigError;

    #[test]
    fn invalid_value_names_its_field() {
        let err = ConfigError::invalid("store.lock_wait_ms", "must be > 0");
        assert_eq!(err.field(), Some("store.lock_wait_ms"));
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'store.lock_wait_ms': must be > 0"
        );
    }
}
