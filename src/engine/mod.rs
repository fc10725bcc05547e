// ============================================================================
// Engine Module
// Pricing rules and the market coordinator
// ============================================================================

mod earliest_price;
mod market;
mod uniform_price;

pub mod factory;

pub use earliest_price::EarliestPrice;
pub use factory::{create_from_config, create_pricing_rule, MarketBuilder};
pub use market::{FollowUps, Market};
pub use uniform_price::UniformPrice;
