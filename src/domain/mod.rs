// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod activity;
pub mod config;
pub mod order;
pub mod order_book;
pub mod quote;
pub mod time;
pub mod transaction;

pub use activity::Activity;
pub use config::{HarnessConfig, MarketConfig, MarketType, PricingRuleType, SimulationConfig};
pub use order::{MarketId, Order, OrderHandle, OwnerId, Price, Quantity, Side};
pub use order_book::{ClearResult, OrderBook, OrderBookLevel, OrderBookSnapshot};
pub use quote::Quote;
pub use time::{Timestamp, When};
pub use transaction::{MatchedPair, Transaction};
