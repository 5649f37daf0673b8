//! Listener tuning parameters.
//!
//! These knobs are deliberately small: the engine's behavior is fixed by
//! contract, only buffer sizing and the polling cadence of the fallback
//! control-line watcher are adjustable. The struct is serde-derived so the
//! owning layer can embed it in its own configuration file.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How many single-read buffers the partial-read accumulation buffer holds.
///
/// A read interrupted by a signal leaves its bytes in the accumulation
/// buffer; consecutive interruptions keep appending. Three read-buffers'
/// worth is sufficient for consecutive multiple partial reads.
pub const ACCUMULATION_FACTOR: usize = 3;

/// Tuning parameters shared by both listener types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Size in bytes of the buffer used for a single non-blocking read.
    pub read_buffer_size: usize,

    /// Cadence of the polling control-line watcher, in milliseconds.
    ///
    /// Only consulted on platforms without a blocking wait-for-line-change
    /// primitive; the blocking watcher ignores it.
    pub poll_interval_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            poll_interval_ms: 500,
        }
    }
}

impl ListenerConfig {
    /// The polling watcher's sleep interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Capacity of the cross-read accumulation buffer.
    pub fn accumulation_capacity(&self) -> usize {
        self.read_buffer_size * ACCUMULATION_FACTOR
    }

    /// Check the configuration for values the listeners cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ZeroReadBuffer);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `read_buffer_size` was zero; every read would return nothing.
    #[error("read_buffer_size must be non-zero")]
    ZeroReadBuffer,

    /// `poll_interval_ms` was zero; the polling watcher would spin.
    #[error("poll_interval_ms must be non-zero")]
    ZeroPollInterval,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_values() {
        let config = ListenerConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.accumulation_capacity(), 3072);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_read_buffer() {
        let config = ListenerConfig {
            read_buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroReadBuffer)
        ));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let config = ListenerConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPollInterval)
        ));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: ListenerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.read_buffer_size, 1024);

        let config: ListenerConfig =
            serde_json::from_str(r#"{"read_buffer_size": 4096}"#).unwrap();
        assert_eq!(config.read_buffer_size, 4096);
        assert_eq!(config.poll_interval_ms, 500);
    }
}
