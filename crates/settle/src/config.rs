//! Settlement tunables.
//!
//! Every threshold the detector uses lives here. The calibration is
//! empirical and application-specific, so all of them can be overridden
//! from YAML or through the builder methods.

use crate::result::{SettleError, SettleResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default overall budget (4 minutes)
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 4 * 60 * 1000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Network idle threshold (500ms without activity)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

/// Action idle threshold (300ms without activity)
pub const ACTION_IDLE_THRESHOLD_MS: u64 = 300;

/// Environment variable overriding [`SettleConfig::timeout_ms`]
pub const TIMEOUT_ENV_VAR: &str = "SETTLE_TIMEOUT_MS";

// =============================================================================
// SETTLE CONFIG
// =============================================================================

/// Tunables for the settlement detector and the follow-up waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    /// Overall budget in milliseconds
    pub timeout_ms: u64,
    /// Interval between polls of the network, script and UI stages
    pub poll_interval_ms: u64,
    /// Quiet time required since the last network activity
    pub network_idle_threshold_ms: u64,
    /// Consecutive idle network polls required
    pub network_idle_polls: u32,
    /// Consecutive idle script polls required
    pub script_idle_polls: u32,
    /// Consecutive stable UI polls required
    pub ui_stable_polls: u32,
    /// Quiet time required by the action-complete check
    pub action_idle_threshold_ms: u64,
    /// Interval between action-complete polls
    pub action_poll_interval_ms: u64,
    /// Interval between loader-disappearance polls
    pub loader_poll_interval_ms: u64,
    /// How far back resource-timing entries count as "recent"
    pub recent_request_window_ms: u64,
    /// Minimum budget handed to a stage once the deadline is near or gone
    pub min_stage_floor_ms: u64,
    /// Upper bound for a single network-idle lifecycle wait
    pub network_idle_cap_ms: u64,
    /// Length of the leading content sample that gets fingerprinted
    pub content_sample_chars: usize,
    /// Extra loader patterns appended to the built-in set
    pub extra_loaders: Vec<String>,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            network_idle_threshold_ms: NETWORK_IDLE_THRESHOLD_MS,
            network_idle_polls: 5,
            script_idle_polls: 3,
            ui_stable_polls: 4,
            action_idle_threshold_ms: ACTION_IDLE_THRESHOLD_MS,
            action_poll_interval_ms: 100,
            loader_poll_interval_ms: 200,
            recent_request_window_ms: 2000,
            min_stage_floor_ms: 1000,
            network_idle_cap_ms: 30_000,
            content_sample_chars: 500,
            extra_loaders: Vec::new(),
        }
    }
}

impl SettleConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the environment override applied
    pub fn from_env() -> SettleResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> SettleResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> SettleResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `SETTLE_TIMEOUT_MS` when it is set
    pub fn with_env_overrides(self) -> SettleResult<Self> {
        match std::env::var(TIMEOUT_ENV_VAR) {
            Ok(raw) => self.with_timeout_override(&raw),
            Err(_) => Ok(self),
        }
    }

    fn with_timeout_override(mut self, raw: &str) -> SettleResult<Self> {
        self.timeout_ms = raw.trim().parse().map_err(|_| {
            SettleError::config(format!("{TIMEOUT_ENV_VAR} must be milliseconds, got {raw:?}"))
        })?;
        Ok(self)
    }

    /// Reject settings that would make polling spin or never settle
    pub fn validate(&self) -> SettleResult<()> {
        let intervals = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("action_poll_interval_ms", self.action_poll_interval_ms),
            ("loader_poll_interval_ms", self.loader_poll_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SettleError::config(format!("{name} must be positive")));
            }
        }
        let windows = [
            ("network_idle_polls", self.network_idle_polls),
            ("script_idle_polls", self.script_idle_polls),
            ("ui_stable_polls", self.ui_stable_polls),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(SettleError::config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Set the overall budget in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the stage polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the stage floor in milliseconds
    #[must_use]
    pub const fn with_min_stage_floor(mut self, floor_ms: u64) -> Self {
        self.min_stage_floor_ms = floor_ms;
        self
    }

    /// Append extra loader patterns
    #[must_use]
    pub fn with_extra_loaders<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_loaders
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Overall budget
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Stage polling interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Network idle threshold
    #[must_use]
    pub const fn network_idle_threshold(&self) -> Duration {
        Duration::from_millis(self.network_idle_threshold_ms)
    }

    /// Action idle threshold
    #[must_use]
    pub const fn action_idle_threshold(&self) -> Duration {
        Duration::from_millis(self.action_idle_threshold_ms)
    }

    /// Action polling interval
    #[must_use]
    pub const fn action_poll_interval(&self) -> Duration {
        Duration::from_millis(self.action_poll_interval_ms)
    }

    /// Loader polling interval
    #[must_use]
    pub const fn loader_poll_interval(&self) -> Duration {
        Duration::from_millis(self.loader_poll_interval_ms)
    }

    /// Stage floor
    #[must_use]
    pub const fn min_stage_floor(&self) -> Duration {
        Duration::from_millis(self.min_stage_floor_ms)
    }

    /// Network idle cap
    #[must_use]
    pub const fn network_idle_cap(&self) -> Duration {
        Duration::from_millis(self.network_idle_cap_ms)
    }
}
