// ============================================================================
// Market & Simulation Configuration
// Market type, pricing rule and run-level settings
// ============================================================================

use crate::error::{SimError, SimResult};
use rust_decimal::Decimal;

use super::Timestamp;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Market Type
// ============================================================================

/// When a market clears its matched orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MarketType {
    /// Continuous double auction
    /// - Every submission triggers an immediate clear
    Continuous,

    /// Call market
    /// - Clears only at multiples of `clear_interval`
    Call {
        /// Ticks between clears (must be positive)
        clear_interval: i64,
    },
}

// ============================================================================
// Pricing Rule Type
// ============================================================================

/// How matched pairs are priced at a clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PricingRuleType {
    /// Each pair trades at the price of its earlier order
    EarliestPrice,

    /// Every pair in a batch trades at one interpolated price
    UniformPrice {
        /// Weight on the highest matched sell price, in [0, 1]
        k: Decimal,
    },
}

impl PricingRuleType {
    /// Uniform pricing at the midpoint of the matched range
    pub fn midpoint() -> Self {
        PricingRuleType::UniformPrice {
            k: Decimal::new(5, 1),
        }
    }
}

// ============================================================================
// Market Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarketConfig {
    /// Label used as prefix for observation features
    pub name: String,

    pub market_type: MarketType,

    pub pricing: PricingRuleType,

    /// Minimum price increment; transaction prices are quantized to it
    pub tick_size: i64,

    /// Delay before owners are notified of their fills
    pub fill_latency: i64,
}

impl MarketConfig {
    pub fn new(name: impl Into<String>, market_type: MarketType, pricing: PricingRuleType) -> Self {
        Self {
            name: name.into(),
            market_type,
            pricing,
            tick_size: 1,
            fill_latency: 0,
        }
    }

    /// Builder method: Set price tick size
    pub fn with_tick_size(mut self, tick: i64) -> Self {
        self.tick_size = tick;
        self
    }

    /// Builder method: Set fill notification latency
    pub fn with_fill_latency(mut self, latency: i64) -> Self {
        self.fill_latency = latency;
        self
    }

    /// Builder method: Replace the pricing rule
    pub fn with_pricing(mut self, pricing: PricingRuleType) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.name.is_empty() {
            return Err(SimError::InvalidConfig(
                "Market name cannot be empty".to_string(),
            ));
        }

        if self.tick_size <= 0 {
            return Err(SimError::InvalidParameter {
                name: "tick_size",
                value: self.tick_size.to_string(),
            });
        }

        if self.fill_latency < 0 {
            return Err(SimError::InvalidParameter {
                name: "fill_latency",
                value: self.fill_latency.to_string(),
            });
        }

        if let MarketType::Call { clear_interval } = self.market_type {
            if clear_interval <= 0 {
                return Err(SimError::InvalidParameter {
                    name: "clear_interval",
                    value: clear_interval.to_string(),
                });
            }
        }

        if let PricingRuleType::UniformPrice { k } = self.pricing {
            if k < Decimal::ZERO || k > Decimal::ONE {
                return Err(SimError::InvalidParameter {
                    name: "k",
                    value: k.to_string(),
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl MarketConfig {
    /// Continuous double auction
    /// - Immediate clear on every submission
    /// - Earliest-price pricing
    pub fn continuous_double_auction(name: impl Into<String>) -> Self {
        Self::new(name, MarketType::Continuous, PricingRuleType::EarliestPrice)
    }

    /// Periodic call market
    /// - Clears every `clear_interval` ticks
    /// - Uniform pricing with weight `k`
    pub fn call_market(name: impl Into<String>, clear_interval: i64, k: Decimal) -> Self {
        Self::new(
            name,
            MarketType::Call { clear_interval },
            PricingRuleType::UniformPrice { k },
        )
    }
}

// ============================================================================
// Simulation Configuration
// ============================================================================

/// Everything needed to build one replication's market graph
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Last timestamp whose activities are executed
    pub end_time: Timestamp,
    pub markets: Vec<MarketConfig>,
}

impl SimulationConfig {
    pub fn new(end_time: Timestamp) -> Self {
        Self {
            end_time,
            markets: Vec::new(),
        }
    }

    pub fn with_market(mut self, market: MarketConfig) -> Self {
        self.markets.push(market);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.end_time < Timestamp::ZERO {
            return Err(SimError::InvalidConfig(format!(
                "End time {} is negative",
                self.end_time
            )));
        }

        for (i, market) in self.markets.iter().enumerate() {
            market.validate()?;
            if self.markets[..i].iter().any(|m| m.name == market.name) {
                return Err(SimError::InvalidConfig(format!(
                    "Duplicate market name {}",
                    market.name
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Harness Configuration
// ============================================================================

/// Batch-level settings for running replications in parallel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HarnessConfig {
    pub replications: usize,
    pub workers: usize,
    pub base_seed: u64,
    /// Finished-but-unemitted results the reorder buffer may hold
    pub buffer_capacity: usize,
    /// Pin workers to cores (only effective with the `numa` feature)
    pub pin_workers: bool,
}

impl HarnessConfig {
    pub fn new(replications: usize, base_seed: u64) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            replications,
            workers,
            base_seed,
            buffer_capacity: workers * 4,
            pin_workers: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_pinned_workers(mut self, pin: bool) -> Self {
        self.pin_workers = pin;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Worker count must be positive".to_string());
        }
        if self.buffer_capacity == 0 {
            return Err("Reorder buffer capacity must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = MarketConfig::continuous_double_auction("cda");

        assert_eq!(config.name, "cda");
        assert_eq!(config.market_type, MarketType::Continuous);
        assert_eq!(config.tick_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MarketConfig::call_market("call", 10, Decimal::new(5, 1))
            .with_tick_size(5)
            .with_fill_latency(2);

        assert_eq!(config.tick_size, 5);
        assert_eq!(config.fill_latency, 2);
        assert_eq!(config.pricing, PricingRuleType::midpoint());
    }

    #[test]
    fn test_validation() {
        assert!(MarketConfig::continuous_double_auction("").validate().is_err());
        assert!(MarketConfig::continuous_double_auction("m")
            .with_tick_size(0)
            .validate()
            .is_err());
        assert!(MarketConfig::call_market("m", 0, Decimal::ONE)
            .validate()
            .is_err());

        let err = MarketConfig::call_market("m", 5, Decimal::new(11, 1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { name: "k", .. }));
    }

    #[test]
    fn test_simulation_rejects_duplicate_names() {
        let config = SimulationConfig::new(Timestamp::new(100))
            .with_market(MarketConfig::continuous_double_auction("a"))
            .with_market(MarketConfig::continuous_double_auction("a"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_harness_config() {
        let config = HarnessConfig::new(8, 42).with_workers(2).with_buffer_capacity(3);
        assert_eq!(config.workers, 2);
        assert!(config.validate().is_ok());
        assert!(config.with_workers(0).validate().is_err());
    }
}
