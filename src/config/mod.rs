//! Configuration management for the cross-venue executor.
//!
//! Loads settings from environment variables and config files. The resulting
//! struct is immutable and passed explicitly at construction; nothing reads
//! credentials from globals.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-venue credentials and endpoints, keyed by venue name
    /// ("bitget", "bybit", ...).
    #[serde(default)]
    pub venues: HashMap<String, VenueConfig>,
    /// Execution engine parameters
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Signal polling parameters
    #[serde(default)]
    pub signal: SignalConfig,
}

/// Credentials and endpoint for one venue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Some venues require an additional API passphrase.
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub base_url: String,
}

/// Parameters of the slice/chase/hedge execution loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Minimum order notional the venue will accept, in quote currency
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,
    /// Fraction of top-of-book volume a slice may consume
    #[serde(default = "default_depth_fraction")]
    pub depth_fraction: Decimal,
    /// Attempts to confirm margin mode + leverage before giving up
    #[serde(default = "default_margin_config_retries")]
    pub margin_config_retries: u32,
    /// Consecutive market-data failures before a cooldown
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Cooldown after repeated failures, in seconds
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
    /// Delay between retries inside a slice iteration, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Order status poll interval, in milliseconds
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
    /// Give up waiting for a slice fill after this long, in milliseconds
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    /// Chase loop poll interval, in milliseconds
    #[serde(default = "default_chase_poll_interval_ms")]
    pub chase_poll_interval_ms: u64,
    /// Chase loop iteration bound
    #[serde(default = "default_chase_max_attempts")]
    pub chase_max_attempts: u32,
    /// Wall-clock ceiling on the close loop, in seconds
    #[serde(default = "default_close_ceiling_secs")]
    pub close_ceiling_secs: u64,
}

/// Signal oracle polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// How often the owning caller polls the oracle, in seconds
    #[serde(default = "default_signal_poll_secs")]
    pub poll_interval_secs: u64,
    /// Cross-venue premium at which the position is worth holding
    #[serde(default = "default_entry_premium")]
    pub entry_premium: Decimal,
    /// Premium below which the position should unwind
    #[serde(default = "default_exit_premium")]
    pub exit_premium: Decimal,
}

// Default value functions
fn default_min_notional() -> Decimal {
    Decimal::new(10, 0) // 10 USDT
}

fn default_depth_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5 = half the visible top-of-book volume
}

fn default_margin_config_retries() -> u32 {
    3
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_failure_cooldown_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_status_poll_interval_ms() -> u64 {
    2_000
}

fn default_order_timeout_ms() -> u64 {
    10_000
}

fn default_chase_poll_interval_ms() -> u64 {
    100
}

fn default_chase_max_attempts() -> u32 {
    10
}

fn default_close_ceiling_secs() -> u64 {
    3_600
}

fn default_signal_poll_secs() -> u64 {
    30
}

fn default_entry_premium() -> Decimal {
    Decimal::new(2, 3) // 0.002 = 0.2%
}

fn default_exit_premium() -> Decimal {
    Decimal::new(5, 4) // 0.0005 = 0.05%
}

impl ExecutionConfig {
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn chase_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chase_poll_interval_ms)
    }

    pub fn close_ceiling(&self) -> Duration {
        Duration::from_secs(self.close_ceiling_secs)
    }
}

impl SignalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("CVX"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.execution.depth_fraction > Decimal::ZERO
                && self.execution.depth_fraction <= Decimal::ONE,
            "depth_fraction must be between 0 and 1"
        );

        anyhow::ensure!(
            self.execution.min_notional >= Decimal::ZERO,
            "min_notional must not be negative"
        );

        anyhow::ensure!(
            self.execution.order_timeout_ms >= self.execution.status_poll_interval_ms,
            "order_timeout_ms must be at least one status poll interval"
        );

        anyhow::ensure!(
            self.execution.chase_max_attempts > 0,
            "chase_max_attempts must be positive"
        );

        anyhow::ensure!(
            self.signal.exit_premium <= self.signal.entry_premium,
            "exit_premium must not exceed entry_premium"
        );

        Ok(())
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min_notional: default_min_notional(),
            depth_fraction: default_depth_fraction(),
            margin_config_retries: default_margin_config_retries(),
            max_consecutive_failures: default_max_consecutive_failures(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
            order_timeout_ms: default_order_timeout_ms(),
            chase_poll_interval_ms: default_chase_poll_interval_ms(),
            chase_max_attempts: default_chase_max_attempts(),
            close_ceiling_secs: default_close_ceiling_secs(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_signal_poll_secs(),
            entry_premium: default_entry_premium(),
            exit_premium: default_exit_premium(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_must_cover_one_poll() {
        let mut config = Config::default();
        config.execution.order_timeout_ms = 100;
        config.execution.status_poll_interval_ms = 2_000;
        assert!(config.validate().is_err());
    }
}
