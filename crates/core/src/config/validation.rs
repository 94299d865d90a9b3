//! Configuration validation rules.
//!
//! This module provides validation logic for `WorkerConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::WorkerConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl WorkerConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is outside 100ms..=60s
    /// - `connect_timeout_ms` is below 100ms or above `timeout_ms`
    /// - `user_agent` is empty
    /// - `batch_limit` is 0
    /// - `max_concurrency` is 0 or exceeds 64
    /// - `max_redirects` exceeds 20
    /// - `run_deadline_secs` is 0
    /// - `stale_claim_secs` is below 60
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 60_000 {
            return Err(invalid("timeout_ms", "must not exceed 60 seconds (60000ms)"));
        }

        if self.connect_timeout_ms < 100 {
            return Err(invalid("connect_timeout_ms", "must be at least 100ms"));
        }
        if self.connect_timeout_ms > self.timeout_ms {
            return Err(invalid("connect_timeout_ms", "must not exceed timeout_ms"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.batch_limit == 0 {
            return Err(invalid("batch_limit", "must be greater than 0"));
        }

        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be greater than 0"));
        }
        if self.max_concurrency > 64 {
            return Err(invalid("max_concurrency", "must not exceed 64"));
        }

        if self.max_redirects > 20 {
            return Err(invalid("max_redirects", "must not exceed 20"));
        }

        if self.run_deadline_secs == Some(0) {
            return Err(invalid("run_deadline_secs", "must be greater than 0 when set"));
        }

        if self.stale_claim_secs < 60 {
            return Err(invalid("stale_claim_secs", "must be at least 60 seconds"));
        }

        if let Some(deadline) = self.run_deadline_secs
            && deadline.saturating_mul(1_000) < self.timeout_ms
        {
            tracing::warn!(
                run_deadline_secs = deadline,
                timeout_ms = self.timeout_ms,
                "run deadline is shorter than a single probe timeout"
            );
        }

        Ok(())
    }
}
