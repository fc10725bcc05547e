// ============================================================================
// Double Auction Simulator Library
// Four-set order books, pricing rules, a discrete-event clock and a
// parallel replication harness
// ============================================================================

//! # Double Auction Simulator
//!
//! Deterministic, seeded simulation of double-auction markets.
//!
//! ## Features
//!
//! - **Four-set order book** keeping the maximal matchable volume ready at
//!   all times
//! - **Pluggable pricing rules** (earliest-price, uniform-price)
//! - **Continuous and call markets** driven by a discrete-event clock
//! - **Seeded tie-breaking** for bit-identical replay
//! - **Parallel replications** emitted in index order
//!
//! ## Example
//!
//! ```rust
//! use double_auction_sim::prelude::*;
//! use std::sync::Arc;
//!
//! let config = SimulationConfig::new(Timestamp::new(100))
//!     .with_market(MarketConfig::continuous_double_auction("cda"));
//! let observer = Arc::new(RecordingObserver::new());
//! let mut sim = Simulation::new(config, 7, observer.clone()).unwrap();
//!
//! let cda = sim.market_id("cda").unwrap();
//! sim.submit_order(cda, OwnerId(1), Side::Buy, Price::new(110), 1, None).unwrap();
//! sim.submit_order(cda, OwnerId(2), Side::Sell, Price::new(100), 1, None).unwrap();
//! sim.run().unwrap();
//!
//! let trades = observer.transactions();
//! assert_eq!(trades.len(), 1);
//! assert_eq!(trades[0].price, Price::new(110));
//!
//! let observation = sim.observation(&ConstantOracle(Price::new(105)));
//! println!("surplus: {:?}", observation.feature("surplus"));
//! ```

pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod harness;
pub mod interfaces;
pub mod simulation;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::clock::{ActivityId, Clock, Scheduled};
    pub use crate::domain::{
        Activity, HarnessConfig, MarketConfig, MarketId, MarketType, Order, OrderBook,
        OrderBookSnapshot, OrderHandle, OwnerId, Price, PricingRuleType, Quantity, Quote, Side,
        SimulationConfig, Timestamp, Transaction, When,
    };
    pub use crate::engine::{
        create_from_config, EarliestPrice, Market, MarketBuilder, UniformPrice,
    };
    pub use crate::error::{HarnessError, SimError, SimResult};
    pub use crate::harness::{replication_seed, FnSink, Harness, ObservationSink, VecSink};
    pub use crate::interfaces::{
        ConstantOracle, LoggingObserver, MarketEvent, MarketObserver, NoOpObserver, Participant,
        PriceOracle, PricingRule, RecordingObserver, TimeSeriesOracle,
    };
    pub use crate::simulation::{
        run_replication, MarketAccess, Observation, PlayerObservation, Simulation,
    };
}
