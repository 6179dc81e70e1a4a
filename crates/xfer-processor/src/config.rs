//! Processor configuration

use std::time::Duration;

use xfer_core::env::{env_get, env_get_opt};
use xfer_core::error::{Result, XferError};

/// Configuration for the processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How long one poll may block inside the engine (default: 1ms)
    pub poll_timeout: Duration,

    /// Sleep between a waiter's polls when its result is not ready (default: 2ms)
    pub poll_interval: Duration,

    /// Name of the worker OS thread
    pub worker_name: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1),
            poll_interval: Duration::from_millis(2),
            worker_name: "xfer-worker".into(),
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `XFER_POLL_TIMEOUT_MS`, `XFER_POLL_INTERVAL_MS`
    /// and `XFER_WORKER_NAME`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_ms: u64 = env_get("XFER_POLL_TIMEOUT_MS", defaults.poll_timeout.as_millis() as u64);
        let interval_ms: u64 = env_get("XFER_POLL_INTERVAL_MS", defaults.poll_interval.as_millis() as u64);
        Self {
            poll_timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(interval_ms),
            worker_name: env_get_opt("XFER_WORKER_NAME").unwrap_or(defaults.worker_name),
        }
    }

    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(XferError::Config("poll_interval must be non-zero".into()));
        }
        if self.worker_name.trim().is_empty() {
            return Err(XferError::Config("worker_name must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ProcessorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval_and_blank_name() {
        let cfg = ProcessorConfig::new().poll_interval(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(XferError::Config(_))));

        let cfg = ProcessorConfig::new().worker_name("  ");
        assert!(matches!(cfg.validate(), Err(XferError::Config(_))));
    }

    #[test]
    fn test_from_env_overlay() {
        std::env::set_var("XFER_POLL_INTERVAL_MS", "9");
        std::env::set_var("XFER_WORKER_NAME", "xfer-env");
        let cfg = ProcessorConfig::from_env();
        std::env::remove_var("XFER_POLL_INTERVAL_MS");
        std::env::remove_var("XFER_WORKER_NAME");

        assert_eq!(cfg.poll_interval, Duration::from_millis(9));
        assert_eq!(cfg.worker_name, "xfer-env");
        assert_eq!(cfg.poll_timeout, ProcessorConfig::default().poll_timeout);
    }
}
