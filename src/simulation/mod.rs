// ============================================================================
// Simulation Module
// One replication: clock, markets, participants and the ledger
// ============================================================================

mod ledger;
mod observation;

pub use ledger::{Account, Ledger};
pub use observation::{Observation, PlayerObservation};

use crate::clock::{ActivityId, Clock};
use crate::domain::{
    Activity, MarketId, OrderHandle, OwnerId, Price, Quantity, Quote, Side, SimulationConfig,
    Timestamp, Transaction, When,
};
use crate::engine::{create_from_config, FollowUps, Market};
use crate::error::{SimError, SimResult};
use crate::interfaces::{MarketObserver, Participant, PriceOracle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// World
// ============================================================================

/// Everything an activity may touch, minus the participants themselves.
pub struct World {
    clock: Clock<Activity>,
    markets: Vec<Market>,
    ledger: Ledger,
    /// Pending expiry per resting order
    expiries: BTreeMap<(MarketId, OrderHandle), ActivityId>,
    /// Generator available to participants
    rng: ChaCha8Rng,
}

impl World {
    fn market(&self, id: MarketId) -> SimResult<&Market> {
        self.markets
            .get(id.0 as usize)
            .ok_or(SimError::UnknownMarket(id))
    }

    fn market_mut(&mut self, id: MarketId) -> SimResult<&mut Market> {
        self.markets
            .get_mut(id.0 as usize)
            .ok_or(SimError::UnknownMarket(id))
    }

    /// Put follow-ups on the clock, remembering where expiries went.
    fn enqueue(&mut self, follow_ups: FollowUps) -> SimResult<()> {
        for scheduled in follow_ups {
            let expiring: SmallVec<[Option<(MarketId, OrderHandle)>; 2]> = scheduled
                .activities
                .iter()
                .map(|a| match a {
                    Activity::Expire { market, order } => Some((*market, *order)),
                    _ => None,
                })
                .collect();
            let ids = self.clock.schedule_all(scheduled)?;
            for (key, id) in expiring.into_iter().zip(ids) {
                if let Some(key) = key {
                    self.expiries.insert(key, id);
                }
            }
        }
        Ok(())
    }

    /// Cancel the expiries of orders that left the book.
    fn settle(&mut self, id: MarketId) -> SimResult<()> {
        for handle in self.market_mut(id)?.take_retired() {
            if let Some(expiry) = self.expiries.remove(&(id, handle)) {
                self.clock.cancel(expiry);
            }
        }
        Ok(())
    }

    fn submit(
        &mut self,
        market: MarketId,
        owner: OwnerId,
        side: Side,
        price: Price,
        quantity: Quantity,
        duration: Option<i64>,
    ) -> SimResult<OrderHandle> {
        let now = self.clock.now();
        let (handle, follow_ups) =
            self.market_mut(market)?
                .submit(owner, side, price, quantity, duration, now)?;
        self.enqueue(follow_ups)?;
        Ok(handle)
    }

    fn withdraw(
        &mut self,
        market: MarketId,
        order: OrderHandle,
        quantity: Option<Quantity>,
    ) -> SimResult<()> {
        let now = self.clock.now();
        let follow_ups = self.market_mut(market)?.withdraw(order, quantity, now)?;
        self.enqueue(follow_ups)?;
        self.settle(market)
    }

    fn expire(&mut self, market: MarketId, order: OrderHandle) -> SimResult<()> {
        self.expiries.remove(&(market, order));
        let now = self.clock.now();
        let follow_ups = self.market_mut(market)?.expire(order, now)?;
        self.enqueue(follow_ups)?;
        self.settle(market)
    }

    fn clear(&mut self, id: MarketId) -> SimResult<()> {
        let now = self.clock.now();
        let market = self
            .markets
            .get_mut(id.0 as usize)
            .ok_or(SimError::UnknownMarket(id))?;
        let before = market.transactions().len();
        let follow_ups = market.clear(now)?;
        for tx in &market.transactions()[before..] {
            self.ledger.apply(tx);
        }
        self.enqueue(follow_ups)?;
        self.settle(id)
    }
}

// ============================================================================
// Market Access (participant context)
// ============================================================================

/// What a participant can do while it is being called.
///
/// Every call happens at the clock's current time.
pub struct MarketAccess<'a> {
    world: &'a mut World,
    participant: usize,
}

impl<'a> MarketAccess<'a> {
    pub fn owner(&self) -> OwnerId {
        OwnerId::participant(self.participant)
    }

    pub fn now(&self) -> Timestamp {
        self.world.clock.now()
    }

    pub fn market_count(&self) -> usize {
        self.world.markets.len()
    }

    pub fn submit_order(
        &mut self,
        market: MarketId,
        side: Side,
        price: Price,
        quantity: Quantity,
        duration: Option<i64>,
    ) -> SimResult<OrderHandle> {
        let owner = self.owner();
        self.world
            .submit(market, owner, side, price, quantity, duration)
    }

    /// Withdraw one of this participant's own orders.
    pub fn withdraw_order(
        &mut self,
        market: MarketId,
        order: OrderHandle,
        quantity: Option<Quantity>,
    ) -> SimResult<()> {
        let owned = self
            .world
            .market(market)?
            .book()
            .get(order)
            .is_some_and(|o| o.owner == self.owner());
        if !owned {
            return Err(SimError::UnknownOrder(order));
        }
        self.world.withdraw(market, order, quantity)
    }

    pub fn quote(&self, market: MarketId) -> SimResult<Quote> {
        Ok(self.world.market(market)?.quote())
    }

    pub fn transaction_history(&self, market: MarketId) -> SimResult<&[Transaction]> {
        Ok(self.world.market(market)?.transactions())
    }

    /// This participant's cash and holdings so far
    pub fn account(&self) -> Account {
        self.world.ledger.account(self.owner())
    }

    /// Schedule another wake-up `delay` ticks from now.
    pub fn wake_in(&mut self, delay: i64) -> SimResult<ActivityId> {
        let now = self.world.clock.now();
        self.world.clock.schedule(
            When::after(now, delay),
            Activity::Wake {
                participant: self.participant,
            },
        )
    }

    /// Replication-seeded generator for participant decisions
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.world.rng
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// One replication's complete market graph
pub struct Simulation {
    config: SimulationConfig,
    world: World,
    participants: Vec<Box<dyn Participant>>,
}

impl Simulation {
    /// Build every configured market and open the call-market schedules.
    pub fn new(
        config: SimulationConfig,
        seed: u64,
        observer: Arc<dyn MarketObserver>,
    ) -> SimResult<Self> {
        config.validate()?;

        let markets = config
            .markets
            .iter()
            .enumerate()
            .map(|(i, m)| create_from_config(MarketId(i as u32), m.clone(), observer.clone()))
            .collect::<SimResult<Vec<_>>>()?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(1);

        let mut world = World {
            clock: Clock::new(seed),
            markets,
            ledger: Ledger::new(),
            expiries: BTreeMap::new(),
            rng,
        };
        for i in 0..world.markets.len() {
            let follow_ups = world.markets[i].open(Timestamp::ZERO);
            world.enqueue(follow_ups)?;
        }

        Ok(Self {
            config,
            world,
            participants: Vec::new(),
        })
    }

    /// Register a participant; it first wakes at `first_wake`.
    ///
    /// The returned owner id lies in the participant range, so external
    /// order flow can never share its fills or its account.
    pub fn add_participant(
        &mut self,
        participant: Box<dyn Participant>,
        first_wake: When,
    ) -> SimResult<OwnerId> {
        let index = self.participants.len();
        self.world
            .clock
            .schedule(first_wake, Activity::Wake { participant: index })?;
        self.participants.push(participant);
        Ok(OwnerId::participant(index))
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.world.clock.now()
    }

    pub fn market_id(&self, name: &str) -> Option<MarketId> {
        self.world
            .markets
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.id())
    }

    pub fn market(&self, id: MarketId) -> SimResult<&Market> {
        self.world.market(id)
    }

    pub fn markets(&self) -> &[Market] {
        &self.world.markets
    }

    pub fn ledger(&self) -> &Ledger {
        &self.world.ledger
    }

    /// Activities waiting on the clock
    pub fn pending_activities(&self) -> usize {
        self.world.clock.pending()
    }

    // ========================================================================
    // External order flow
    // ========================================================================

    /// Schedule an activity from outside the simulation.
    pub fn schedule(&mut self, when: When, activity: Activity) -> SimResult<()> {
        self.world
            .enqueue(vec![crate::clock::Scheduled::one(when, activity)])
    }

    /// Schedule activities that must execute back to back.
    pub fn schedule_group(
        &mut self,
        when: When,
        activities: impl IntoIterator<Item = Activity>,
    ) -> SimResult<()> {
        self.world
            .enqueue(vec![crate::clock::Scheduled::group(when, activities)])
    }

    /// Submit an external order right now.
    ///
    /// Owners in the participant range are rejected; participants trade
    /// through `MarketAccess`.
    pub fn submit_order(
        &mut self,
        market: MarketId,
        owner: OwnerId,
        side: Side,
        price: Price,
        quantity: Quantity,
        duration: Option<i64>,
    ) -> SimResult<OrderHandle> {
        let owner = external(owner)?;
        self.world
            .submit(market, owner, side, price, quantity, duration)
    }

    /// Withdraw part (or all, with `None`) of an order right now.
    pub fn withdraw_order(
        &mut self,
        market: MarketId,
        order: OrderHandle,
        quantity: Option<Quantity>,
    ) -> SimResult<()> {
        self.world.withdraw(market, order, quantity)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run until the configured end time.
    pub fn run(&mut self) -> SimResult<usize> {
        self.run_until(self.config.end_time)
    }

    /// Execute bucket after bucket up to and including `end`.
    pub fn run_until(&mut self, end: Timestamp) -> SimResult<usize> {
        let mut executed = 0;
        while let Some((at, batch)) = self.world.clock.next_bucket(end) {
            for (id, activity) in batch {
                if !self.world.clock.claim(id) {
                    continue;
                }
                tracing::trace!(%id, %at, ?activity, "executing");
                self.execute(activity)?;
                executed += 1;
            }
        }
        Ok(executed)
    }

    fn execute(&mut self, activity: Activity) -> SimResult<()> {
        match activity {
            Activity::SubmitOrder {
                market,
                owner,
                side,
                price,
                quantity,
                duration,
            } => {
                let owner = external(owner)?;
                self.world
                    .submit(market, owner, side, price, quantity, duration)
                    .map(|_| ())
            },
            Activity::WithdrawOrder {
                market,
                order,
                quantity,
            } => self.world.withdraw(market, order, quantity),
            Activity::Expire { market, order } => self.world.expire(market, order),
            Activity::Clear { market } => self.world.clear(market),
            Activity::Wake { participant } => {
                let agent = self
                    .participants
                    .get_mut(participant)
                    .ok_or(SimError::UnknownParticipant(participant))?;
                let mut access = MarketAccess {
                    world: &mut self.world,
                    participant,
                };
                agent.on_wake(&mut access)
            },
            Activity::NotifyFill { owner, transaction } => {
                // External order flow gets no notifications.
                let Some(participant) = owner.participant_index() else {
                    return Ok(());
                };
                let agent = self
                    .participants
                    .get_mut(participant)
                    .ok_or(SimError::UnknownParticipant(participant))?;
                let mut access = MarketAccess {
                    world: &mut self.world,
                    participant,
                };
                agent.on_fill(&mut access, &transaction)
            },
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Payoffs and market features, liquidating holdings at the end time.
    pub fn observation(&self, oracle: &dyn PriceOracle) -> Observation {
        let value = oracle.value_at(self.config.end_time);
        let mut observation = Observation::default();

        let mut owners: BTreeMap<OwnerId, String> = self
            .participants
            .iter()
            .enumerate()
            .map(|(i, p)| (OwnerId::participant(i), p.name().to_string()))
            .collect();
        for (owner, _) in self.world.ledger.accounts() {
            owners.entry(owner).or_insert_with(|| "external".to_string());
        }

        for (owner, name) in owners {
            let account = self.world.ledger.account(owner);
            observation.players.push(PlayerObservation {
                owner,
                name,
                holdings: account.holdings,
                cash: account.cash,
                payoff: account.liquidation_value(value) as f64,
            });
        }

        for market in &self.world.markets {
            let name = market.name();
            let txs = market.transactions();
            let volume: Quantity = txs.iter().map(|t| t.quantity).sum();
            let features = &mut observation.features;
            features.insert(format!("{}_transactions", name), txs.len() as f64);
            features.insert(format!("{}_volume", name), volume as f64);
            if !txs.is_empty() {
                let mean = txs.iter().map(|t| t.price.units() as f64).sum::<f64>() / txs.len() as f64;
                features.insert(format!("{}_mean_price", name), mean);
            }
            if let Some(spread) = market.quote().spread() {
                features.insert(format!("{}_final_spread", name), spread as f64);
            }
        }

        let surplus = observation.total_payoff();
        observation.features.insert("surplus".to_string(), surplus);
        observation
    }
}

/// External flow must stay below the participant owner range.
fn external(owner: OwnerId) -> SimResult<OwnerId> {
    match owner.participant_index() {
        Some(_) => Err(SimError::InvalidParameter {
            name: "owner",
            value: format!("{} is reserved for participants", owner),
        }),
        None => Ok(owner),
    }
}

/// Build, populate, run and observe one replication.
pub fn run_replication<F>(
    config: &SimulationConfig,
    seed: u64,
    observer: Arc<dyn MarketObserver>,
    oracle: &dyn PriceOracle,
    setup: F,
) -> SimResult<Observation>
where
    F: FnOnce(&mut Simulation) -> SimResult<()>,
{
    let mut simulation = Simulation::new(config.clone(), seed, observer)?;
    setup(&mut simulation)?;
    simulation.run()?;
    Ok(simulation.observation(oracle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketConfig;
    use crate::interfaces::{ConstantOracle, NoOpObserver, RecordingObserver};
    use rand::Rng;
    use rust_decimal::Decimal;

    fn cda_config(end: i64) -> SimulationConfig {
        SimulationConfig::new(Timestamp::new(end))
            .with_market(MarketConfig::continuous_double_auction("cda"))
    }

    fn submit(market: MarketId, owner: u32, side: Side, price: i64, quantity: Quantity) -> Activity {
        Activity::SubmitOrder {
            market,
            owner: OwnerId(owner),
            side,
            price: Price::new(price),
            quantity,
            duration: None,
        }
    }

    /// Buys once at a fixed price and records its fills.
    struct Buyer {
        price: Price,
        fills: Vec<Transaction>,
        woke_at: Vec<Timestamp>,
    }

    impl Participant for Buyer {
        fn on_wake(&mut self, market: &mut MarketAccess<'_>) -> SimResult<()> {
            self.woke_at.push(market.now());
            if self.woke_at.len() == 1 {
                market.submit_order(MarketId(0), Side::Buy, self.price, 1, None)?;
                market.wake_in(10)?;
            }
            Ok(())
        }

        fn on_fill(&mut self, _market: &mut MarketAccess<'_>, fill: &Transaction) -> SimResult<()> {
            self.fills.push(fill.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "buyer"
        }
    }

    #[test]
    fn test_scheduled_orders_trade_and_update_ledger() {
        let mut sim = Simulation::new(cda_config(100), 1, Arc::new(NoOpObserver)).unwrap();
        let m = sim.market_id("cda").unwrap();
        sim.schedule(When::At(Timestamp::new(5)), submit(m, 1, Side::Sell, 100, 2))
            .unwrap();
        sim.schedule(When::At(Timestamp::new(7)), submit(m, 2, Side::Buy, 104, 2))
            .unwrap();
        sim.run().unwrap();

        let txs = sim.market(m).unwrap().transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].price, Price::new(100));
        assert_eq!(txs[0].time, Timestamp::new(7));
        assert_eq!(sim.ledger().account(OwnerId(2)).holdings, 2);
        assert_eq!(sim.ledger().account(OwnerId(1)).cash, 200);
    }

    #[test]
    fn test_expiry_withdraws_unfilled_order() {
        let mut sim = Simulation::new(cda_config(100), 1, Arc::new(NoOpObserver)).unwrap();
        let m = MarketId(0);
        let handle = sim
            .submit_order(m, OwnerId(1), Side::Buy, Price::new(90), 1, Some(10))
            .unwrap();
        sim.run_until(Timestamp::new(9)).unwrap();
        assert!(sim.market(m).unwrap().book().contains(handle));

        sim.run_until(Timestamp::new(10)).unwrap();
        assert!(sim.market(m).unwrap().book().is_empty());
        assert_eq!(sim.pending_activities(), 0);
    }

    #[test]
    fn test_fill_cancels_pending_expiry() {
        let mut sim = Simulation::new(cda_config(100), 1, Arc::new(NoOpObserver)).unwrap();
        let m = MarketId(0);
        sim.submit_order(m, OwnerId(1), Side::Buy, Price::new(100), 1, Some(50))
            .unwrap();
        sim.submit_order(m, OwnerId(2), Side::Sell, Price::new(100), 1, None)
            .unwrap();
        sim.run_until(Timestamp::ZERO).unwrap();

        assert_eq!(sim.market(m).unwrap().transactions().len(), 1);
        // The expiry at t=50 is gone along with the order.
        assert_eq!(sim.pending_activities(), 0);
    }

    #[test]
    fn test_participant_wakes_and_gets_fills() {
        let mut sim = Simulation::new(cda_config(100), 3, Arc::new(NoOpObserver)).unwrap();
        let owner = sim
            .add_participant(
                Box::new(Buyer {
                    price: Price::new(105),
                    fills: Vec::new(),
                    woke_at: Vec::new(),
                }),
                When::At(Timestamp::new(2)),
            )
            .unwrap();
        assert_eq!(owner, OwnerId::participant(0));
        sim.schedule(When::At(Timestamp::new(4)), submit(MarketId(0), 7, Side::Sell, 100, 1))
            .unwrap();
        sim.run().unwrap();

        let observation = sim.observation(&ConstantOracle(Price::new(110)));
        let buyer = observation.player(owner).unwrap();
        assert_eq!(buyer.name, "buyer");
        assert_eq!(buyer.holdings, 1);
        assert_eq!(buyer.cash, -105);
        assert_eq!(buyer.payoff, 5.0);
        assert_eq!(observation.player(OwnerId(7)).unwrap().name, "external");
        assert_eq!(observation.feature("cda_transactions"), Some(1.0));
        assert_eq!(observation.feature("cda_mean_price"), Some(105.0));
        assert_eq!(observation.feature("cda_final_spread"), None);
        assert_eq!(observation.feature("surplus"), Some(0.0));
    }

    #[test]
    fn test_external_flow_cannot_use_participant_owner() {
        let mut sim = Simulation::new(cda_config(100), 3, Arc::new(NoOpObserver)).unwrap();
        let owner = sim
            .add_participant(
                Box::new(Buyer {
                    price: Price::new(105),
                    fills: Vec::new(),
                    woke_at: Vec::new(),
                }),
                When::At(Timestamp::new(2)),
            )
            .unwrap();

        // Low ids stay external even when they equal the participant index.
        sim.submit_order(MarketId(0), OwnerId(0), Side::Sell, Price::new(100), 1, None)
            .unwrap();
        assert!(matches!(
            sim.submit_order(MarketId(0), owner, Side::Sell, Price::new(100), 1, None),
            Err(SimError::InvalidParameter { name: "owner", .. })
        ));
        sim.schedule(When::At(Timestamp::new(1)), submit(MarketId(0), owner.0, Side::Buy, 90, 1))
            .unwrap();
        assert!(matches!(
            sim.run(),
            Err(SimError::InvalidParameter { name: "owner", .. })
        ));
    }

    #[test]
    fn test_external_owner_zero_keeps_its_own_account() {
        let mut sim = Simulation::new(cda_config(100), 3, Arc::new(NoOpObserver)).unwrap();
        let owner = sim
            .add_participant(
                Box::new(Buyer {
                    price: Price::new(105),
                    fills: Vec::new(),
                    woke_at: Vec::new(),
                }),
                When::At(Timestamp::new(2)),
            )
            .unwrap();
        sim.schedule(When::At(Timestamp::new(4)), submit(MarketId(0), 0, Side::Sell, 100, 1))
            .unwrap();
        sim.run().unwrap();

        assert_eq!(sim.ledger().account(owner).holdings, 1);
        assert_eq!(sim.ledger().account(OwnerId(0)).holdings, -1);
        let observation = sim.observation(&ConstantOracle(Price::new(100)));
        assert_eq!(observation.player(OwnerId(0)).unwrap().name, "external");
        assert_eq!(observation.player(owner).unwrap().name, "buyer");
    }

    #[test]
    fn test_participant_cannot_withdraw_foreign_order() {
        struct Meddler;
        impl Participant for Meddler {
            fn on_wake(&mut self, market: &mut MarketAccess<'_>) -> SimResult<()> {
                market.withdraw_order(MarketId(0), OrderHandle::new(1), None)
            }
        }

        let mut sim = Simulation::new(cda_config(10), 3, Arc::new(NoOpObserver)).unwrap();
        sim.submit_order(MarketId(0), OwnerId(5), Side::Buy, Price::new(90), 1, None)
            .unwrap();
        sim.add_participant(Box::new(Meddler), When::At(Timestamp::new(1)))
            .unwrap();
        assert_eq!(
            sim.run(),
            Err(SimError::UnknownOrder(OrderHandle::new(1)))
        );
    }

    #[test]
    fn test_call_market_clears_periodically() {
        let config = SimulationConfig::new(Timestamp::new(25)).with_market(
            MarketConfig::call_market("call", 10, Decimal::new(5, 1)),
        );
        let observer = Arc::new(RecordingObserver::new());
        let mut sim = Simulation::new(config, 1, observer.clone()).unwrap();
        sim.schedule(When::At(Timestamp::new(3)), submit(MarketId(0), 1, Side::Sell, 100, 1))
            .unwrap();
        sim.schedule(When::At(Timestamp::new(4)), submit(MarketId(0), 2, Side::Buy, 110, 1))
            .unwrap();

        sim.run_until(Timestamp::new(9)).unwrap();
        assert!(sim.market(MarketId(0)).unwrap().transactions().is_empty());

        sim.run().unwrap();
        let txs = observer.transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].time, Timestamp::new(10));
        assert_eq!(txs[0].price, Price::new(105));
        // Next clear already waits at t=30.
        assert_eq!(sim.pending_activities(), 1);
    }

    #[test]
    fn test_unknown_market_is_an_error() {
        let mut sim = Simulation::new(cda_config(10), 1, Arc::new(NoOpObserver)).unwrap();
        assert_eq!(
            sim.submit_order(MarketId(4), OwnerId(0), Side::Buy, Price::new(1), 1, None),
            Err(SimError::UnknownMarket(MarketId(4)))
        );
    }

    #[test]
    fn test_run_replication_is_reproducible() {
        /// Random-priced single-unit orders.
        struct Noise;
        impl Participant for Noise {
            fn on_wake(&mut self, market: &mut MarketAccess<'_>) -> SimResult<()> {
                let side = if market.rng().gen_bool(0.5) { Side::Buy } else { Side::Sell };
                let price = Price::new(market.rng().gen_range(90..=110));
                market.submit_order(MarketId(0), side, price, 1, Some(20))?;
                market.wake_in(3)?;
                Ok(())
            }
        }

        let config = cda_config(200);
        let run = |seed| {
            let observer = Arc::new(RecordingObserver::new());
            let observation = run_replication(
                &config,
                seed,
                observer.clone(),
                &ConstantOracle(Price::new(100)),
                |sim| {
                    for _ in 0..4 {
                        sim.add_participant(Box::new(Noise), When::Immediate)?;
                    }
                    Ok(())
                },
            )
            .unwrap();
            (observation, observer.events())
        };

        assert_eq!(run(11), run(11));
        assert!(run(11).0.feature("cda_transactions").unwrap() > 0.0);
    }
}
