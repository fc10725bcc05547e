// ============================================================================
// Pricing Rule Interface
// Defines the contract for pluggable clearing-price policies
// ============================================================================

use crate::domain::{MatchedPair, Price};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Round `value` to the nearest multiple of `tick`, halves toward +infinity.
///
/// Computed as `floor(value / tick + 1/2) * tick`.
pub fn quantize_to_tick(value: Decimal, tick: i64) -> Price {
    let tick = tick.max(1);
    let steps = (value / Decimal::from(tick) + Decimal::new(5, 1)).floor();
    let steps = steps.to_i64().unwrap_or(if steps.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    });
    Price::new(steps.saturating_mul(tick))
}

/// Strategy pattern interface for clearing prices
/// Implementations: EarliestPrice, UniformPrice
///
/// Rules are stateless: the same batch always prices the same way.
pub trait PricingRule: Send + Sync {
    /// Price every pair of one clearing batch
    ///
    /// # Arguments
    /// * `batch` - All pairs produced by a single clear, best-first
    ///
    /// # Returns
    /// One price per pair, in batch order
    fn price_batch(&self, batch: &[MatchedPair]) -> Vec<Price>;

    /// Get the rule name for logging
    fn name(&self) -> &str;

    /// Minimum price increment prices are quantized to
    fn tick_size(&self) -> i64;

    /// Quantize a raw price with this rule's tick size
    fn quantize(&self, value: Decimal) -> Price {
        quantize_to_tick(value, self.tick_size())
    }
}
