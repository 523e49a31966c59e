//! Configuration types for the gateway and its markets.
//!
//! Everything is plain serde so the whole [`GatewayConfig`] can be loaded
//! from one JSON document. Durations are configured in milliseconds.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Address, GatewayError, Result, constants};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Market name → address table.
    pub markets: Vec<MarketConfig>,
    pub protocol: ProtocolLimits,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub tracker: TrackerConfig,
}

impl GatewayConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.protocol.max_ops_per_tx == 0 {
            return Err(GatewayError::Configuration(
                "protocol.maxOpsPerTx must be > 0".into(),
            ));
        }
        if self.protocol.compute_budget_units == 0 {
            return Err(GatewayError::Configuration(
                "protocol.computeBudgetUnits must be > 0".into(),
            ));
        }
        if self.retry.max_submit_attempts == 0 || self.retry.remote_max_attempts == 0 {
            return Err(GatewayError::Configuration(
                "retry attempt ceilings must be > 0".into(),
            ));
        }
        if self.tracker.capacity == 0 {
            return Err(GatewayError::Configuration(
                "tracker.capacity must be > 0".into(),
            ));
        }
        let mut seen = HashSet::new();
        for market in &self.markets {
            if market.name.trim().is_empty() {
                return Err(GatewayError::Configuration("market with empty name".into()));
            }
            if !seen.insert(market.name.as_str()) {
                return Err(GatewayError::Configuration(format!(
                    "duplicate market name: {}",
                    market.name
                )));
            }
        }
        Ok(())
    }
}

/// One entry of the market table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConfig {
    pub name: String,
    pub address: Address,
    pub program_id: Address,
    #[serde(default)]
    pub deprecated: bool,
}

impl MarketConfig {
    #[must_use]
    pub fn new(name: &str, address: &str, program_id: &str) -> Self {
        Self {
            name: name.to_string(),
            address: Address::new(address),
            program_id: Address::new(program_id),
            deprecated: false,
        }
    }
}

/// Protocol ceilings for one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolLimits {
    pub max_ops_per_tx: usize,
    pub compute_budget_units: u64,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            max_ops_per_tx: constants::DEFAULT_MAX_OPS_PER_TX,
            compute_budget_units: constants::DEFAULT_COMPUTE_BUDGET_UNITS,
        }
    }
}

/// Per-phase timeouts, enforced independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub submission_ms: u64,
    pub confirmation_ms: u64,
    pub poll_interval_ms: u64,
    pub lock_acquire_ms: u64,
    pub status_recheck_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            submission_ms: constants::DEFAULT_SUBMISSION_TIMEOUT_MS,
            confirmation_ms: constants::DEFAULT_CONFIRMATION_TIMEOUT_MS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            lock_acquire_ms: constants::DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS,
            status_recheck_interval_ms: constants::DEFAULT_STATUS_RECHECK_INTERVAL_MS,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn submission(&self) -> Duration {
        Duration::from_millis(self.submission_ms)
    }

    #[must_use]
    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn lock_acquire(&self) -> Duration {
        Duration::from_millis(self.lock_acquire_ms)
    }

    #[must_use]
    pub fn status_recheck_interval(&self) -> Duration {
        Duration::from_millis(self.status_recheck_interval_ms)
    }
}

/// Retry ceilings and backoff shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Attempts for a batch that keeps failing before inclusion.
    pub max_submit_attempts: u32,
    /// Signature re-checks after a timeout before surfacing AMBIGUOUS.
    pub max_status_rechecks: u32,
    /// Attempts for a remote call failing with "unavailable".
    pub remote_max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_submit_attempts: constants::DEFAULT_MAX_SUBMIT_ATTEMPTS,
            max_status_rechecks: constants::DEFAULT_MAX_STATUS_RECHECKS,
            remote_max_attempts: constants::DEFAULT_REMOTE_MAX_ATTEMPTS,
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: constants::DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for `attempt` (1-based), capped, before jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Bounds on the local reconciliation working set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Tracked orders before the oldest are evicted.
    pub capacity: usize,
    /// Recently observed fills/cancels kept per (owner, market).
    pub history_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_TRACKER_CAPACITY,
            history_window: constants::DEFAULT_HISTORY_WINDOW,
        }
    }
}
