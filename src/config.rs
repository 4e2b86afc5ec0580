use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::FillPolicy;

/// Main configuration structure for the execution engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Fill policies in broker-compatibility preference order. The order is
    /// a contract, not a hint: the fallback sequencer walks it as declared.
    #[serde(default = "default_fill_policies")]
    pub fill_policies: Vec<FillPolicy>,
}

fn default_fill_policies() -> Vec<FillPolicy> {
    vec![
        FillPolicy::ImmediateOrCancel,
        FillPolicy::Return,
        FillPolicy::FillOrKill,
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            validation: ValidationConfig::default(),
            fill_policies: default_fill_policies(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retry attempt cap per order session
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff delay ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Hard wall-clock budget per session in milliseconds
    #[serde(default = "default_max_total_elapsed_ms")]
    pub max_total_elapsed_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    300
}
fn default_max_delay_ms() -> u64 {
    4_000
}
fn default_backoff_multiplier() -> f64 {
    1.3
}
fn default_max_total_elapsed_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_total_elapsed_ms: default_max_total_elapsed_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_total_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_total_elapsed_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Max submissions in any rolling 60-second window
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    /// Max submissions in any rolling 3600-second window
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
    /// Minimum spacing between consecutive submissions in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_per_minute() -> u32 {
    10
}
fn default_per_hour() -> u32 {
    60
}
fn default_min_interval_ms() -> u64 {
    1_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive session failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds to wait in Open before allowing a half-open probe
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_secs() -> u64 {
    300
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Instrument metadata freshness window in seconds
    #[serde(default = "default_instrument_ttl_secs")]
    pub instrument_ttl_secs: u64,
    /// Quote freshness window in milliseconds
    #[serde(default = "default_quote_ttl_ms")]
    pub quote_ttl_ms: u64,
    /// Account state freshness window in seconds
    #[serde(default = "default_account_ttl_secs")]
    pub account_ttl_secs: u64,
    /// Per-category entry cap; the sweep evicts expired-first, then oldest
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_instrument_ttl_secs() -> u64 {
    30
}
fn default_quote_ttl_ms() -> u64 {
    2_000
}
fn default_account_ttl_secs() -> u64 {
    60
}
fn default_max_entries() -> usize {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            instrument_ttl_secs: default_instrument_ttl_secs(),
            quote_ttl_ms: default_quote_ttl_ms(),
            account_ttl_secs: default_account_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn instrument_ttl(&self) -> Duration {
        Duration::from_secs(self.instrument_ttl_secs)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_millis(self.quote_ttl_ms)
    }

    pub fn account_ttl(&self) -> Duration {
        Duration::from_secs(self.account_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Quote deviation from the order's reference price (in percent) beyond
    /// which a warning is attached. A warning, not a rejection: volatile
    /// markets must not be blocked outright.
    #[serde(default = "default_max_price_deviation_pct")]
    pub max_price_deviation_pct: Decimal,
    /// Minimum account margin level (percent) required to trade
    #[serde(default = "default_min_margin_level")]
    pub min_margin_level: Decimal,
}

fn default_max_price_deviation_pct() -> Decimal {
    Decimal::ONE
}
fn default_min_margin_level() -> Decimal {
    Decimal::from(200)
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_price_deviation_pct: default_max_price_deviation_pct(),
            min_margin_level: default_min_margin_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ORDGATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ORDGATE_RETRY__MAX_ATTEMPTS, etc.)
            .add_source(
                Environment::with_prefix("ORDGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values, collecting every problem at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms == 0 {
            errors.push("retry.base_delay_ms must be positive".to_string());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push("retry.max_delay_ms must be >= retry.base_delay_ms".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            errors.push("retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.retry.max_total_elapsed_ms == 0 {
            errors.push("retry.max_total_elapsed_ms must be positive".to_string());
        }

        if self.rate_limit.per_minute == 0 {
            errors.push("rate_limit.per_minute must be at least 1".to_string());
        }
        if self.rate_limit.per_hour < self.rate_limit.per_minute {
            errors.push("rate_limit.per_hour must be >= rate_limit.per_minute".to_string());
        }
        if self.rate_limit.min_interval_ms >= 60_000 {
            errors.push("rate_limit.min_interval_ms must be under one minute".to_string());
        }

        if self.circuit_breaker.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.circuit_breaker.recovery_timeout_secs == 0 {
            errors.push("circuit_breaker.recovery_timeout_secs must be positive".to_string());
        }

        if self.cache.quote_ttl_ms == 0 {
            errors.push("cache.quote_ttl_ms must be positive".to_string());
        }
        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be at least 1".to_string());
        }

        if self.validation.max_price_deviation_pct <= Decimal::ZERO {
            errors.push("validation.max_price_deviation_pct must be positive".to_string());
        }
        if self.validation.min_margin_level < Decimal::ONE_HUNDRED {
            errors.push("validation.min_margin_level below 100% would allow stop-out territory".to_string());
        }

        if self.fill_policies.is_empty() {
            errors.push("fill_policies must declare at least one policy".to_string());
        } else {
            let mut seen = Vec::new();
            for policy in &self.fill_policies {
                if seen.contains(policy) {
                    errors.push(format!("fill_policies lists '{policy}' more than once"));
                }
                seen.push(*policy);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(300));
        assert_eq!(config.cache.quote_ttl(), Duration::from_millis(2_000));
        assert_eq!(
            config.fill_policies,
            vec![
                FillPolicy::ImmediateOrCancel,
                FillPolicy::Return,
                FillPolicy::FillOrKill
            ]
        );
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        config.rate_limit.per_minute = 0;
        config.fill_policies = vec![FillPolicy::FillOrKill, FillPolicy::FillOrKill];

        let errors = config.validate().expect_err("should fail");
        assert!(errors.len() >= 3, "expected every problem listed: {errors:?}");
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("per_minute")));
        assert!(errors.iter().any(|e| e.contains("more than once")));
    }

    #[test]
    fn per_hour_must_cover_per_minute() {
        let mut config = EngineConfig::default();
        config.rate_limit.per_minute = 100;
        config.rate_limit.per_hour = 50;

        let errors = config.validate().expect_err("should fail");
        assert!(errors.iter().any(|e| e.contains("per_hour")));
    }

    #[test]
    fn empty_policy_list_rejected() {
        let mut config = EngineConfig::default();
        config.fill_policies.clear();
        let errors = config.validate().expect_err("should fail");
        assert!(errors.iter().any(|e| e.contains("fill_policies")));
    }
}
