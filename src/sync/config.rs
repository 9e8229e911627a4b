/*!
 * Synchronization Configuration
 *
 * Runtime configuration for wait bounds and deferred reclamation
 */

use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::{
    DEFAULT_RECLAIM_DELAY, DEFAULT_WAIT_TIMEOUT, ENV_DEFERRED_RECLAIM, ENV_RECLAIM_DELAY_MS,
    ENV_WAIT_TIMEOUT_MS, MAX_RECLAIM_DELAY, MAX_WAIT_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SyncConfig {
    /// Bound on a single wait before it proceeds anyway
    pub wait_timeout: Duration,
    /// Delay before a superseded reader fence reference is dropped
    pub reclaim_delay: Duration,
    /// Arm the delayed reclaim task on every read grant
    pub deferred_reclaim: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            reclaim_delay: DEFAULT_RECLAIM_DELAY,
            deferred_reclaim: true,
        }
    }
}

impl SyncConfig {
    /// Configuration for replay and unit tests: short waits, no timer thread
    pub fn immediate() -> Self {
        Self {
            wait_timeout: Duration::from_millis(500),
            reclaim_delay: Duration::ZERO,
            deferred_reclaim: false,
        }
    }

    /// Defaults overridden by `BUFSYNC_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>(ENV_WAIT_TIMEOUT_MS) {
            config.wait_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>(ENV_RECLAIM_DELAY_MS) {
            config.reclaim_delay = Duration::from_millis(ms);
        }
        if let Ok(raw) = std::env::var(ENV_DEFERRED_RECLAIM) {
            match raw.as_str() {
                "1" | "true" => config.deferred_reclaim = true,
                "0" | "false" => config.deferred_reclaim = false,
                other => warn!(var = ENV_DEFERRED_RECLAIM, value = other, "ignoring invalid value"),
            }
        }

        config
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_reclaim_delay(mut self, delay: Duration) -> Self {
        self.reclaim_delay = delay;
        self
    }

    pub fn with_deferred_reclaim(mut self, enabled: bool) -> Self {
        self.deferred_reclaim = enabled;
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.wait_timeout.is_zero() {
            return Err(SyncError::InvalidConfig(
                "wait timeout must be non-zero".to_string(),
            ));
        }
        if self.wait_timeout > MAX_WAIT_TIMEOUT {
            return Err(SyncError::InvalidConfig(format!(
                "wait timeout {:?} exceeds {:?}",
                self.wait_timeout, MAX_WAIT_TIMEOUT
            )));
        }
        if self.reclaim_delay > MAX_RECLAIM_DELAY {
            return Err(SyncError::InvalidConfig(format!(
                "reclaim delay {:?} exceeds {:?}",
                self.reclaim_delay, MAX_RECLAIM_DELAY
            )));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.wait_timeout, Duration::from_millis(5000));
        assert_eq!(config.reclaim_delay, Duration::from_millis(500));
        assert!(config.deferred_reclaim);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SyncConfig::default()
            .with_wait_timeout(Duration::from_millis(250))
            .with_reclaim_delay(Duration::from_millis(20))
            .with_deferred_reclaim(false);
        assert_eq!(
            config,
            SyncConfig {
                wait_timeout: Duration::from_millis(250),
                reclaim_delay: Duration::from_millis(20),
                deferred_reclaim: false,
            }
        );
    }

    #[test]
    fn test_validation_limits() {
        assert!(matches!(
            SyncConfig::default()
                .with_wait_timeout(Duration::ZERO)
                .validate(),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(SyncConfig::default()
            .with_wait_timeout(Duration::from_secs(61))
            .validate()
            .is_err());
        assert!(SyncConfig::default()
            .with_reclaim_delay(Duration::from_secs(11))
            .validate()
            .is_err());
        assert!(SyncConfig::immediate().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"deferred_reclaim": false}"#).unwrap();
        assert_eq!(config.wait_timeout, DEFAULT_WAIT_TIMEOUT);
        assert!(!config.deferred_reclaim);
    }
}
