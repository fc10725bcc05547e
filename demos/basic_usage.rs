// ============================================================================
// Basic Usage Example
// ============================================================================

use double_auction_sim::prelude::*;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Zero-intelligence trader: random side and price around a valuation.
struct RandomTrader {
    valuation: i64,
}

impl Participant for RandomTrader {
    fn on_wake(&mut self, market: &mut MarketAccess<'_>) -> SimResult<()> {
        let buy = market.rng().gen_bool(0.5);
        let shade = market.rng().gen_range(0..=10);
        let (side, price) = if buy {
            (Side::Buy, self.valuation - shade)
        } else {
            (Side::Sell, self.valuation + shade)
        };
        market.submit_order(MarketId(0), side, Price::new(price), 1, Some(30))?;
        let delay = market.rng().gen_range(5..=15);
        market.wake_in(delay)?;
        Ok(())
    }

    fn on_fill(&mut self, market: &mut MarketAccess<'_>, fill: &Transaction) -> SimResult<()> {
        println!(
            "  t={} {} filled {} @ {}",
            market.now(),
            market.owner(),
            fill.quantity,
            fill.price
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "random"
    }
}

fn main() {
    #[cfg(feature = "logging")]
    double_auction_sim::utils::init_logging("double_auction_sim=info");

    println!("=== Double Auction Example ===\n");

    // One continuous market and one call market clearing every 20 ticks
    let config = SimulationConfig::new(Timestamp::new(200))
        .with_market(MarketConfig::continuous_double_auction("cda"))
        .with_market(MarketConfig::call_market("call", 20, Decimal::new(5, 1)));

    let observer = Arc::new(RecordingObserver::new());
    let mut sim = Simulation::new(config.clone(), 2024, observer.clone()).unwrap();

    for i in 0..6 {
        sim.add_participant(
            Box::new(RandomTrader {
                valuation: 95 + i * 2,
            }),
            When::At(Timestamp::new(i)),
        )
        .unwrap();
    }

    println!("Running single replication...");
    let executed = sim.run().unwrap();
    println!("\nExecuted {} activities", executed);

    let cda = sim.market_id("cda").unwrap();
    let snapshot = sim.market(cda).unwrap().snapshot(5, sim.now());
    println!("\n=== Order Book Snapshot ===");
    println!("\nBids:");
    for level in &snapshot.bids {
        println!("  {} @ {}", level.quantity, level.price);
    }
    println!("\nAsks:");
    for level in &snapshot.asks {
        println!("  {} @ {}", level.quantity, level.price);
    }
    println!("\nQuote: {:?}", sim.market(cda).unwrap().quote());
    println!("Transactions recorded: {}", observer.transactions().len());

    let observation = sim.observation(&ConstantOracle(Price::new(100)));
    println!("\n=== Observation ===");
    for player in &observation.players {
        println!(
            "  {} ({}): holdings {}, cash {}, payoff {}",
            player.owner, player.name, player.holdings, player.cash, player.payoff
        );
    }
    for (name, value) in &observation.features {
        println!("  {} = {}", name, value);
    }

    // Same setup replicated in parallel
    println!("\n=== Harness ===");
    let harness = Harness::new(HarnessConfig::new(8, 2024)).unwrap();
    let observations = harness
        .run_collect(|_, seed| {
            run_replication(
                &config,
                seed,
                Arc::new(NoOpObserver),
                &ConstantOracle(Price::new(100)),
                |sim| {
                    for i in 0..6 {
                        sim.add_participant(
                            Box::new(RandomTrader {
                                valuation: 95 + i * 2,
                            }),
                            When::At(Timestamp::new(i)),
                        )?;
                    }
                    Ok(())
                },
            )
        })
        .unwrap();

    for (index, observation) in observations.iter().enumerate() {
        println!(
            "  replication {}: cda volume {:?}, call volume {:?}",
            index,
            observation.feature("cda_volume"),
            observation.feature("call_volume")
        );
    }
}
