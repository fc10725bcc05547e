// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod market_observer;
mod participant;
mod price_oracle;
mod pricing_rule;

pub use market_observer::{
    LoggingObserver, MarketEvent, MarketObserver, NoOpObserver, RecordingObserver,
};
pub use participant::Participant;
pub use price_oracle::{ConstantOracle, PriceOracle, TimeSeriesOracle};
pub use pricing_rule::{quantize_to_tick, PricingRule};
