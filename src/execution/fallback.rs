//! Fill-policy fallback sequencer
//!
//! Venues reject orders whose fill policy they do not support. The sequencer
//! walks an ordered list of policies, advancing only on fill-incompatibility,
//! and falls back to the venue default (no policy set) when the whole list is
//! incompatible. Price-related rejections get one quote refresh and re-submit
//! under the same policy before the failure is handed back to the retry loop.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{Direction, FillPolicy, OrderRequest, Outcome};
use crate::gateway::{classify_submit, failure_class, FailureClass, GatewayClient};
use crate::validation::ValidationCache;

/// One pass through the policy sequence.
#[derive(Debug, Clone)]
pub struct FallbackResult {
    pub outcome: Outcome,
    /// Policy in effect on the final submission. `None` means the venue
    /// default was used after the configured list was exhausted.
    pub policy_used: Option<FillPolicy>,
}

pub struct FillPolicySequencer {
    policies: Vec<FillPolicy>,
    cache: Arc<ValidationCache>,
}

impl FillPolicySequencer {
    pub fn new(policies: Vec<FillPolicy>, cache: Arc<ValidationCache>) -> Self {
        Self { policies, cache }
    }

    /// Run the policy sequence for one submission attempt. Exactly one
    /// gateway submit per policy, plus at most one price-refresh re-submit
    /// per policy and at most one trailing venue-default submission.
    pub async fn execute(
        &self,
        gateway: &dyn GatewayClient,
        request: &OrderRequest,
    ) -> FallbackResult {
        for policy in self.sequence_for(request) {
            let attempt = request.with_policy_override(Some(policy));
            let mut price_refreshed = false;
            let mut current = attempt;

            loop {
                let outcome = classify_submit(gateway.submit(&current).await);
                match failure_class(&outcome) {
                    None => {
                        info!(policy = %policy, "order filled");
                        return FallbackResult {
                            outcome,
                            policy_used: Some(policy),
                        };
                    }
                    Some(FailureClass::FillIncompatible) => {
                        debug!(policy = %policy, "fill policy not supported, advancing");
                        break;
                    }
                    Some(FailureClass::PriceRelated) if !price_refreshed => {
                        price_refreshed = true;
                        match self.cache.refresh_quote(gateway, &current.instrument).await {
                            Ok(quote) => {
                                current.reference_price = match current.direction {
                                    Direction::Buy => quote.ask,
                                    Direction::Sell => quote.bid,
                                };
                                debug!(
                                    policy = %policy,
                                    price = %current.reference_price,
                                    "price rejected, re-submitting at fresh quote"
                                );
                            }
                            Err(e) => {
                                warn!(error = %e, "quote refresh failed after price rejection");
                                return FallbackResult {
                                    outcome,
                                    policy_used: Some(policy),
                                };
                            }
                        }
                    }
                    Some(_) => {
                        return FallbackResult {
                            outcome,
                            policy_used: Some(policy),
                        };
                    }
                }
            }
        }

        // Every configured policy was incompatible; let the venue decide.
        debug!("policy list exhausted, submitting with venue default");
        let outcome = classify_submit(
            gateway
                .submit(&request.with_policy_override(None))
                .await,
        );
        FallbackResult {
            outcome,
            policy_used: None,
        }
    }

    /// Configured order, with the request's own policy hint promoted to the
    /// front when present.
    fn sequence_for(&self, request: &OrderRequest) -> Vec<FillPolicy> {
        match request.fill_policy {
            Some(hint) => {
                let mut sequence = vec![hint];
                sequence.extend(self.policies.iter().copied().filter(|p| *p != hint));
                sequence
            }
            None => self.policies.clone(),
        }
    }
}
