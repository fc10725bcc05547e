// ============================================================================
// Earliest-Price Rule
// Standard continuous double auction pricing
// ============================================================================

use crate::domain::{MatchedPair, Price};
use crate::interfaces::PricingRule;

/// Each pair trades at the limit price of whichever order arrived first
///
/// The resting order sets the price, which is the usual continuous-market
/// convention. Arrival keys are unique per market, so "first" is never tied.
///
/// # Example
/// ```text
/// Book:  Buy  1 @ 110 (arrival 1)
///        Sell 1 @ 100 (arrival 2)
///
/// Clear: one pair, priced at 110 (the buy arrived first)
/// ```
pub struct EarliestPrice {
    tick_size: i64,
}

impl EarliestPrice {
    pub fn new(tick_size: i64) -> Self {
        Self { tick_size }
    }
}

impl Default for EarliestPrice {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PricingRule for EarliestPrice {
    fn price_batch(&self, batch: &[MatchedPair]) -> Vec<Price> {
        batch
            .iter()
            .map(|pair| self.quantize(pair.earliest().price.to_decimal()))
            .collect()
    }

    fn name(&self) -> &str {
        "EarliestPrice"
    }

    fn tick_size(&self) -> i64 {
        self.tick_size
    }
}
