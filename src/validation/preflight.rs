//! Pre-flight order validation
//!
//! Cheap local checks against cached venue facts before an order is allowed
//! to consume a rate-limit slot. Checks run in order and stop at the first
//! failure; a stale reference price is a warning, not a rejection.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ValidationConfig;
use crate::domain::OrderRequest;
use crate::error::{OrdgateError, Result};
use crate::gateway::GatewayClient;
use crate::validation::ValidationCache;

/// Outcome of a passed validation. Warnings are non-fatal findings the
/// caller may log or attach to the execution report.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub warnings: Vec<String>,
}

pub struct PreflightValidator {
    config: ValidationConfig,
    cache: Arc<ValidationCache>,
}

impl PreflightValidator {
    pub fn new(config: ValidationConfig, cache: Arc<ValidationCache>) -> Self {
        Self { config, cache }
    }

    /// Validate an order against instrument, quote, and account state.
    /// Gateway lookup failures propagate as gateway errors, not as
    /// validation rejections.
    pub async fn validate(
        &self,
        gateway: &dyn GatewayClient,
        request: &OrderRequest,
    ) -> Result<Validation> {
        let mut warnings = Vec::new();

        if request.volume <= Decimal::ZERO {
            return Err(OrdgateError::Validation(format!(
                "volume {} must be positive",
                request.volume
            )));
        }

        let info = self
            .cache
            .instrument(gateway, &request.instrument)
            .await
            .map_err(|e| OrdgateError::Gateway(e.to_string()))?;

        if !info.trade_allowed {
            return Err(OrdgateError::Validation(format!(
                "trading disabled for instrument {}",
                request.instrument
            )));
        }
        if request.volume < info.min_volume || request.volume > info.max_volume {
            return Err(OrdgateError::Validation(format!(
                "volume {} outside [{}, {}] for {}",
                request.volume, info.min_volume, info.max_volume, request.instrument
            )));
        }
        if !info.volume_step.is_zero() && !(request.volume % info.volume_step).is_zero() {
            return Err(OrdgateError::Validation(format!(
                "volume {} not aligned to step {} for {}",
                request.volume, info.volume_step, request.instrument
            )));
        }

        let quote = self
            .cache
            .quote(gateway, &request.instrument)
            .await
            .map_err(|e| OrdgateError::Gateway(e.to_string()))?;

        let mid = quote.mid();
        if !mid.is_zero() {
            let deviation_pct =
                ((request.reference_price - mid) / mid * Decimal::ONE_HUNDRED).abs();
            if deviation_pct > self.config.max_price_deviation_pct {
                let warning = format!(
                    "reference price {} deviates {:.2}% from market mid {}",
                    request.reference_price, deviation_pct, mid
                );
                warn!(instrument = %request.instrument, %warning, "price deviation");
                warnings.push(warning);
            }
        }

        let account = self
            .cache
            .account(gateway)
            .await
            .map_err(|e| OrdgateError::Gateway(e.to_string()))?;

        if !account.trade_allowed {
            return Err(OrdgateError::Validation(
                "trading disabled on account".to_string(),
            ));
        }
        // A zero margin level means no positions are open, not exhaustion.
        if !account.margin_level.is_zero() && account.margin_level < self.config.min_margin_level {
            return Err(OrdgateError::Validation(format!(
                "margin level {} below floor {}",
                account.margin_level, self.config.min_margin_level
            )));
        }
        if account.free_margin <= Decimal::ZERO {
            return Err(OrdgateError::Validation(format!(
                "no free margin available ({})",
                account.free_margin
            )));
        }

        debug!(
            instrument = %request.instrument,
            volume = %request.volume,
            warnings = warnings.len(),
            "pre-flight validation passed"
        );
        Ok(Validation { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::domain::{AccountInfo, Direction, InstrumentInfo, Quote};
    use crate::gateway::MockGatewayClient;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn validator() -> PreflightValidator {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = Arc::new(ValidationCache::new(CacheConfig::default(), clock));
        PreflightValidator::new(ValidationConfig::default(), cache)
    }

    fn healthy_gateway() -> MockGatewayClient {
        let mut gateway = MockGatewayClient::new();
        gateway.expect_instrument_info().returning(|_| {
            Ok(InstrumentInfo {
                min_volume: dec!(0.01),
                max_volume: dec!(10),
                volume_step: dec!(0.01),
                trade_allowed: true,
            })
        });
        gateway.expect_quote().returning(|_| {
            Ok(Quote {
                bid: dec!(2350.00),
                ask: dec!(2350.40),
                timestamp: Utc::now(),
            })
        });
        gateway.expect_account_info().returning(|| {
            Ok(AccountInfo {
                trade_allowed: true,
                margin_level: dec!(350),
                free_margin: dec!(10_000),
            })
        });
        gateway
    }

    fn order(volume: Decimal, reference_price: Decimal) -> OrderRequest {
        OrderRequest::new("XAUUSD", Direction::Buy, volume, reference_price)
    }

    #[tokio::test]
    async fn well_formed_order_passes_without_warnings() {
        let gateway = healthy_gateway();
        let validation = validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2350.20)))
            .await
            .expect("should pass");
        assert!(validation.warnings.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_positive_volume_before_any_lookup() {
        // No expectations set: a gateway call would panic the mock.
        let gateway = MockGatewayClient::new();
        let err = validator()
            .validate(&gateway, &order(dec!(0), dec!(2350)))
            .await
            .expect_err("zero volume");
        assert!(matches!(err, OrdgateError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_volume_outside_instrument_bounds() {
        let gateway = healthy_gateway();
        let err = validator()
            .validate(&gateway, &order(dec!(50), dec!(2350)))
            .await
            .expect_err("above max");
        assert!(err.to_string().contains("outside"));
    }

    #[tokio::test]
    async fn rejects_volume_not_aligned_to_step() {
        let gateway = healthy_gateway();
        let err = validator()
            .validate(&gateway, &order(dec!(0.015), dec!(2350)))
            .await
            .expect_err("misaligned");
        assert!(err.to_string().contains("not aligned"));
    }

    #[tokio::test]
    async fn rejects_when_instrument_trading_disabled() {
        let mut gateway = MockGatewayClient::new();
        gateway.expect_instrument_info().returning(|_| {
            Ok(InstrumentInfo {
                min_volume: dec!(0.01),
                max_volume: dec!(10),
                volume_step: dec!(0.01),
                trade_allowed: false,
            })
        });
        let err = validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2350)))
            .await
            .expect_err("instrument disabled");
        assert!(err.to_string().contains("trading disabled"));
    }

    #[tokio::test]
    async fn stale_reference_price_warns_but_passes() {
        let gateway = healthy_gateway();
        // Mid is 2350.20; a 2% stale reference exceeds the 1% default.
        let validation = validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2397.00)))
            .await
            .expect("deviation is a warning, not a rejection");
        assert_eq!(validation.warnings.len(), 1);
        assert!(validation.warnings[0].contains("deviates"));
    }

    fn gateway_with_account(margin_level: Decimal, free_margin: Decimal) -> MockGatewayClient {
        let mut gateway = MockGatewayClient::new();
        gateway.expect_instrument_info().returning(|_| {
            Ok(InstrumentInfo {
                min_volume: dec!(0.01),
                max_volume: dec!(10),
                volume_step: dec!(0.01),
                trade_allowed: true,
            })
        });
        gateway.expect_quote().returning(|_| {
            Ok(Quote {
                bid: dec!(2350.00),
                ask: dec!(2350.40),
                timestamp: Utc::now(),
            })
        });
        gateway.expect_account_info().returning(move || {
            Ok(AccountInfo {
                trade_allowed: true,
                margin_level,
                free_margin,
            })
        });
        gateway
    }

    #[tokio::test]
    async fn rejects_margin_level_below_floor() {
        let gateway = gateway_with_account(dec!(150), dec!(10_000));
        let err = validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2350.20)))
            .await
            .expect_err("margin level below floor");
        assert!(err.to_string().contains("margin level"));
    }

    #[tokio::test]
    async fn zero_margin_level_means_no_open_positions() {
        let gateway = gateway_with_account(dec!(0), dec!(10_000));
        validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2350.20)))
            .await
            .expect("zero margin level is not exhaustion");
    }

    #[tokio::test]
    async fn rejects_when_free_margin_exhausted() {
        let gateway = gateway_with_account(dec!(350), dec!(0));
        let err = validator()
            .validate(&gateway, &order(dec!(0.10), dec!(2350.20)))
            .await
            .expect_err("no free margin");
        assert!(err.to_string().contains("free margin"));
    }
}
