use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CLEANUP_DELAY_MS: u64 = 30_000;

/// Registry tuning, read from the `[registry]` table of the vault config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long an idle handle stays registered before it is evicted.
    pub cleanup_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cleanup_delay_ms: DEFAULT_CLEANUP_DELAY_MS,
        }
    }
}

impl RegistryConfig {
    pub fn with_cleanup_delay(delay: Duration) -> Self {
        Self {
            cleanup_delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}
