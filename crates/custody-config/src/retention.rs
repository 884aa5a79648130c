//! Retention policy configuration.
//!
//! Windows are keyed by audit scope name. A scope with no window is
//! disabled: the retention engine records it as such and purges nothing.
//!
//! ```toml
//! [retention]
//! batch_size = 500
//!
//! [retention.windows]
//! admin = 365
//! integration = 30
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use custody_core::enums::AuditScope;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Longest accepted retention window, one hundred years.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Default number of entries selected per purge batch.
const fn default_batch_size() -> u32 {
    500
}

fn default_actor_id() -> String {
    "retention-scheduler".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Entries selected per batch; bounds memory and lock-hold time.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Actor recorded on purge runs started by the scheduler.
    #[serde(default = "default_actor_id")]
    pub actor_id: String,

    /// Retention window in days per scope name.
    #[serde(default)]
    pub windows: BTreeMap<String, u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            actor_id: default_actor_id(),
            windows: BTreeMap::new(),
        }
    }
}

impl RetentionConfig {
    /// Builder used by tests and embedders to set one window.
    #[must_use]
    pub fn with_window(mut self, scope: AuditScope, days: u32) -> Self {
        self.windows.insert(scope.as_str().to_string(), days);
        self
    }

    /// Parsed windows, keyed by scope.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown scope name or a
    /// window of zero days or more than [`MAX_WINDOW_DAYS`].
    pub fn scope_windows(&self) -> Result<BTreeMap<AuditScope, u32>, ConfigError> {
        let mut parsed = BTreeMap::new();
        for (name, days) in &self.windows {
            let field = format!("retention.windows.{name}");
            let scope = AuditScope::from_str(name)
                .map_err(|e| ConfigError::invalid(field.as_str(), e.to_string()))?;
            if *days == 0 {
                return Err(ConfigError::invalid(
                    field,
                    "must be > 0 days; omit the scope to disable retention",
                ));
            }
            if *days > MAX_WINDOW_DAYS {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be at most {MAX_WINDOW_DAYS} days"),
                ));
            }
            parsed.insert(scope, *days);
        }
        Ok(parsed)
    }

    /// Window for one scope, `None` when retention is disabled for it.
    #[must_use]
    pub fn window_for(&self, scope: AuditScope) -> Option<u32> {
        self.windows.get(scope.as_str()).copied()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("retention.batch_size", "must be > 0"));
        }
        self.scope_windows().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_disable_every_scope() {
        let config = RetentionConfig::default();
        assert_eq!(config.batch_size, 500);
        for scope in AuditScope::ALL {
            assert_eq!(config.window_for(scope), None);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn with_window_sets_scope() {
        let config = RetentionConfig::default().with_window(AuditScope::Admin, 30);
        assert_eq!(config.window_for(AuditScope::Admin), Some(30));
        assert_eq!(
            config.scope_windows().unwrap(),
            BTreeMap::from([(AuditScope::Admin, 30)])
        );
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let mut config = RetentionConfig::default();
        config.windows.insert("billing".into(), 10);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention.windows.billing"), "{err}");
    }

    #[test]
    fn zero_day_window_is_rejected() {
        let config = RetentionConfig::default().with_window(AuditScope::Config, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn window_beyond_maximum_is_rejected() {
        let config = RetentionConfig::default().with_window(AuditScope::Access, u32::MAX);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), Some("retention.windows.access"));

        let config = RetentionConfig::default().with_window(AuditScope::Access, MAX_WINDOW_DAYS);
        assert!(config.validate().is_ok());
    }
}
