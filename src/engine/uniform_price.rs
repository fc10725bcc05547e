// ============================================================================
// Uniform-Price Rule
// Used in call markets (k-double auction)
// ============================================================================

use crate::domain::{MatchedPair, Price};
use crate::error::{SimError, SimResult};
use crate::interfaces::PricingRule;
use rust_decimal::Decimal;

/// One price for the whole batch, interpolated between the boundary prices
///
/// The boundary is taken from price values only: the highest matched sell
/// and the lowest matched buy in the batch. Which of several equally extreme
/// orders supplies the boundary therefore never matters.
///
/// # Example
/// ```text
/// Matched: Buy 110, Buy 105 / Sell 104, Sell 108
/// Boundary: max sell = 108, min buy = 105
///
/// k = 0.5:  0.5 * 108 + 0.5 * 105 = 106.5 -> 107 (tick 1)
/// ```
pub struct UniformPrice {
    /// Weight on the highest matched sell price
    k: Decimal,
    tick_size: i64,
}

impl UniformPrice {
    pub fn new(k: Decimal, tick_size: i64) -> SimResult<Self> {
        if k < Decimal::ZERO || k > Decimal::ONE {
            return Err(SimError::InvalidParameter {
                name: "k",
                value: k.to_string(),
            });
        }
        if tick_size <= 0 {
            return Err(SimError::InvalidParameter {
                name: "tick_size",
                value: tick_size.to_string(),
            });
        }
        Ok(Self { k, tick_size })
    }

    pub fn k(&self) -> Decimal {
        self.k
    }

    /// (max matched sell, min matched buy) of a batch
    fn boundary(batch: &[MatchedPair]) -> Option<(Price, Price)> {
        let max_sell = batch.iter().map(|p| p.sell.price).max()?;
        let min_buy = batch.iter().map(|p| p.buy.price).min()?;
        Some((max_sell, min_buy))
    }

    /// Clearing price for a batch, `None` when the batch is empty
    pub fn clearing_price(&self, batch: &[MatchedPair]) -> Option<Price> {
        let (max_sell, min_buy) = Self::boundary(batch)?;
        let raw = self.k * max_sell.to_decimal() + (Decimal::ONE - self.k) * min_buy.to_decimal();
        Some(self.quantize(raw))
    }
}

impl PricingRule for UniformPrice {
    fn price_batch(&self, batch: &[MatchedPair]) -> Vec<Price> {
        match self.clearing_price(batch) {
            Some(price) => vec![price; batch.len()],
            None => Vec::new(),
        }
    }

    fn name(&self) -> &str {
        "UniformPrice"
    }

    fn tick_size(&self) -> i64 {
        self.tick_size
    }
}
