//! Chain store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_path() -> String {
    ".custody/audit.db".to_string()
}

/// Default bounded wait for a tenant write lease, in milliseconds.
const fn default_lock_wait_ms() -> u64 {
    5_000
}

/// Default cap on the encoded size of one entry's payloads (1 MiB).
const fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// libSQL database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// How long an append waits for its tenant lease before failing with a
    /// retryable contention error.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Upper bound on the canonical encoding of `context` + `before` + `after`.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            lock_wait_ms: default_lock_wait_ms(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.path.trim().is_empty() {
            return Err(ConfigError::invalid("store.path", "must not be empty"));
        }
        if self.lock_wait_ms == 0 {
            return Err(ConfigError::invalid("store.lock_wait_ms", "must be > 0"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("store.max_payload_bytes", "must be > 0"));
        }
        Ok(())
    }
}
