// ============================================================================
// Market Factory
// Creates markets with proper configuration
// ============================================================================

use crate::domain::{MarketConfig, MarketId, MarketType, PricingRuleType};
use crate::engine::{EarliestPrice, Market, UniformPrice};
use crate::error::SimResult;
use crate::interfaces::{MarketObserver, PricingRule};
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a market from configuration
///
/// # Arguments
/// * `id` - Market index within its simulation
/// * `config` - Market configuration
/// * `observer` - Observer for this replication's market events
///
/// # Example
/// ```
/// use double_auction_sim::prelude::*;
/// use std::sync::Arc;
///
/// let config = MarketConfig::continuous_double_auction("cda");
/// let market = create_from_config(MarketId(0), config, Arc::new(NoOpObserver)).unwrap();
/// assert_eq!(market.rule_name(), "EarliestPrice");
/// ```
pub fn create_from_config(
    id: MarketId,
    config: MarketConfig,
    observer: Arc<dyn MarketObserver>,
) -> SimResult<Market> {
    config.validate()?;
    let rule = create_pricing_rule(&config.pricing, config.tick_size)?;
    Ok(Market::new(id, config, rule, observer))
}

/// Creates the pricing rule named by the configuration
pub fn create_pricing_rule(
    rule_type: &PricingRuleType,
    tick_size: i64,
) -> SimResult<Box<dyn PricingRule>> {
    match rule_type {
        PricingRuleType::EarliestPrice => Ok(Box::new(EarliestPrice::new(tick_size))),
        PricingRuleType::UniformPrice { k } => Ok(Box::new(UniformPrice::new(*k, tick_size)?)),
    }
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for creating markets with fluent API
///
/// # Example
/// ```
/// use double_auction_sim::prelude::*;
/// use rust_decimal::Decimal;
/// use std::sync::Arc;
///
/// let market = MarketBuilder::new("call")
///     .call_market(10)
///     .uniform_price(Decimal::new(5, 1))
///     .with_tick_size(5)
///     .build(MarketId(0), Arc::new(NoOpObserver))
///     .unwrap();
/// assert_eq!(market.name(), "call");
/// ```
pub struct MarketBuilder {
    config: MarketConfig,
}

impl MarketBuilder {
    /// Create a new builder; defaults to a continuous earliest-price market
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: MarketConfig::continuous_double_auction(name),
        }
    }

    // ========================================================================
    // Market Type Configuration
    // ========================================================================

    /// Clear on every submission (default)
    pub fn continuous(mut self) -> Self {
        self.config.market_type = MarketType::Continuous;
        self
    }

    /// Clear every `clear_interval` ticks
    pub fn call_market(mut self, clear_interval: i64) -> Self {
        self.config.market_type = MarketType::Call { clear_interval };
        self
    }

    // ========================================================================
    // Pricing Configuration
    // ========================================================================

    /// Price each pair at its earlier order (default)
    pub fn earliest_price(mut self) -> Self {
        self.config.pricing = PricingRuleType::EarliestPrice;
        self
    }

    /// Price every pair of a batch at one interpolated price
    pub fn uniform_price(mut self, k: Decimal) -> Self {
        self.config.pricing = PricingRuleType::UniformPrice { k };
        self
    }

    // ========================================================================
    // Additional Configuration
    // ========================================================================

    pub fn with_tick_size(mut self, tick_size: i64) -> Self {
        self.config.tick_size = tick_size;
        self
    }

    pub fn with_fill_latency(mut self, latency: i64) -> Self {
        self.config.fill_latency = latency;
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    pub fn build(self, id: MarketId, observer: Arc<dyn MarketObserver>) -> SimResult<Market> {
        create_from_config(id, self.config, observer)
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn into_config(self) -> MarketConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::interfaces::NoOpObserver;

    #[test]
    fn test_create_continuous_market() {
        let config = MarketConfig::continuous_double_auction("cda");
        let market = create_from_config(MarketId(3), config, Arc::new(NoOpObserver)).unwrap();
        assert_eq!(market.id(), MarketId(3));
        assert_eq!(market.name(), "cda");
        assert_eq!(market.rule_name(), "EarliestPrice");
    }

    #[test]
    fn test_create_call_market() {
        let config = MarketConfig::call_market("call", 5, Decimal::ONE);
        let market = create_from_config(MarketId(0), config, Arc::new(NoOpObserver)).unwrap();
        assert_eq!(market.rule_name(), "UniformPrice");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MarketConfig::call_market("call", 5, Decimal::TWO);
        assert!(matches!(
            create_from_config(MarketId(0), config, Arc::new(NoOpObserver)),
            Err(SimError::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn test_builder_pattern() {
        let builder = MarketBuilder::new("m")
            .call_market(20)
            .uniform_price(Decimal::new(25, 2))
            .with_tick_size(2)
            .with_fill_latency(1);

        assert_eq!(
            builder.get_config().market_type,
            MarketType::Call { clear_interval: 20 }
        );
        let market = builder.build(MarketId(0), Arc::new(NoOpObserver)).unwrap();
        assert_eq!(market.config().tick_size, 2);
        assert_eq!(market.config().fill_latency, 1);
    }

    #[test]
    fn test_builder_defaults() {
        let config = MarketBuilder::new("m").into_config();
        assert_eq!(config, MarketConfig::continuous_double_auction("m"));
        let back = MarketBuilder::new("m")
            .call_market(3)
            .continuous()
            .earliest_price()
            .into_config();
        assert_eq!(back.market_type, MarketType::Continuous);
    }
}
