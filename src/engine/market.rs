// ============================================================================
// Market
// Coordinates the order book, the pricing rule and clear scheduling
// ============================================================================

use crate::clock::Scheduled;
use crate::domain::{
    Activity, MarketConfig, MarketId, MarketType, Order, OrderBook, OrderBookSnapshot,
    OrderHandle, OwnerId, Price, Quantity, Quote, Side, Timestamp, Transaction, When,
};
use crate::error::{SimError, SimResult};
use crate::interfaces::{MarketEvent, MarketObserver, PricingRule};
use std::sync::Arc;

/// Work a market operation asks the clock to run later
pub type FollowUps = Vec<Scheduled<Activity>>;

/// Single-replication market: the only place transactions are created
pub struct Market {
    id: MarketId,

    config: MarketConfig,

    /// Four-set order book
    book: OrderBook,

    /// Pluggable pricing rule
    rule: Box<dyn PricingRule>,

    /// Per-replication observer
    observer: Arc<dyn MarketObserver>,

    /// Last arrival key handed out
    arrivals: u64,

    /// Last published quote
    quote: Quote,

    transactions: Vec<Transaction>,

    /// Orders that left the book since the last `take_retired`
    retired: Vec<OrderHandle>,

    /// Next periodic clear already on the clock (call markets)
    scheduled_clear: Option<Timestamp>,
}

impl Market {
    pub fn new(
        id: MarketId,
        config: MarketConfig,
        rule: Box<dyn PricingRule>,
        observer: Arc<dyn MarketObserver>,
    ) -> Self {
        Self {
            id,
            config,
            book: OrderBook::new(),
            rule,
            observer,
            arrivals: 0,
            quote: Quote::empty(Timestamp::ZERO),
            transactions: Vec::new(),
            retired: Vec::new(),
            scheduled_clear: None,
        }
    }

    pub fn id(&self) -> MarketId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Last published quote
    pub fn quote(&self) -> Quote {
        self.quote
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn snapshot(&self, depth: usize, now: Timestamp) -> OrderBookSnapshot {
        self.book.snapshot(depth, now)
    }

    /// Handles of orders that left the book since the previous call
    pub fn take_retired(&mut self) -> Vec<OrderHandle> {
        std::mem::take(&mut self.retired)
    }

    /// Start the periodic clear schedule of a call market.
    pub fn open(&mut self, now: Timestamp) -> FollowUps {
        match self.config.market_type {
            MarketType::Call { clear_interval } if self.scheduled_clear.is_none() => {
                self.schedule_next_clear(now, clear_interval)
            },
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Order Flow
    // ========================================================================

    /// Insert a new limit order at `now`.
    ///
    /// The price must be a multiple of the market's tick size, so that
    /// quantized trade prices stay within both orders' limits.
    pub fn submit(
        &mut self,
        owner: OwnerId,
        side: Side,
        price: Price,
        quantity: Quantity,
        duration: Option<i64>,
        now: Timestamp,
    ) -> SimResult<(OrderHandle, FollowUps)> {
        if self.config.tick_size > 1 && price.units() % self.config.tick_size != 0 {
            return Err(SimError::InvalidParameter {
                name: "price",
                value: format!("{} is not a multiple of tick {}", price, self.config.tick_size),
            });
        }
        if let Some(duration) = duration {
            if duration <= 0 {
                return Err(SimError::InvalidParameter {
                    name: "duration",
                    value: duration.to_string(),
                });
            }
        }

        let handle = OrderHandle::new(self.arrivals + 1);
        let order = Order::new(handle, owner, side, price, quantity, now);
        self.book.insert(order.clone())?;
        self.arrivals += 1;

        tracing::debug!(
            market = %self.id,
            order = %handle,
            %owner,
            ?side,
            %price,
            quantity,
            "order submitted"
        );
        self.observer.on_event(&MarketEvent::OrderSubmitted {
            market: self.id,
            order,
        });
        self.publish_quote(now);

        let mut follow_ups = Vec::new();
        if let Some(duration) = duration {
            follow_ups.push(Scheduled::one(
                When::At(now.plus(duration)),
                Activity::Expire {
                    market: self.id,
                    order: handle,
                },
            ));
        }
        if self.config.market_type == MarketType::Continuous {
            follow_ups.push(Scheduled::immediately(Activity::Clear { market: self.id }));
        }
        Ok((handle, follow_ups))
    }

    /// Withdraw `quantity` units, or everything left when `None`.
    pub fn withdraw(
        &mut self,
        handle: OrderHandle,
        quantity: Option<Quantity>,
        now: Timestamp,
    ) -> SimResult<FollowUps> {
        let quantity = match quantity {
            Some(q) => q,
            None => {
                self.book
                    .get(handle)
                    .ok_or(SimError::UnknownOrder(handle))?
                    .quantity
            },
        };
        let remaining = self.book.withdraw(handle, quantity)?;
        if remaining == 0 {
            self.retired.push(handle);
        }

        tracing::debug!(market = %self.id, order = %handle, quantity, remaining, "order withdrawn");
        self.observer.on_event(&MarketEvent::OrderWithdrawn {
            market: self.id,
            order: handle,
            quantity,
            remaining,
            time: now,
        });
        self.publish_quote(now);
        Ok(Vec::new())
    }

    /// Withdraw the rest of an order whose duration ran out.
    ///
    /// An order that already left the book expires silently.
    pub fn expire(&mut self, handle: OrderHandle, now: Timestamp) -> SimResult<FollowUps> {
        if !self.book.contains(handle) {
            return Ok(Vec::new());
        }
        tracing::debug!(market = %self.id, order = %handle, "order expired");
        self.withdraw(handle, None, now)
    }

    /// Pull matched pairs, price them and emit one transaction per pair.
    pub fn clear(&mut self, now: Timestamp) -> SimResult<FollowUps> {
        let result = self.book.clear();
        let prices = self.rule.price_batch(&result.pairs);
        assert_eq!(
            prices.len(),
            result.pairs.len(),
            "pricing rule {} priced a batch partially",
            self.rule.name()
        );

        let mut notifications = Vec::with_capacity(result.pairs.len() * 2);
        for (pair, price) in result.pairs.iter().zip(prices) {
            let tx = Transaction::from_pair(self.id, pair, price, now);
            self.observer.on_event(&MarketEvent::Transaction(tx.clone()));
            notifications.push(Activity::NotifyFill {
                owner: tx.buyer,
                transaction: tx.clone(),
            });
            notifications.push(Activity::NotifyFill {
                owner: tx.seller,
                transaction: tx.clone(),
            });
            self.transactions.push(tx);
        }
        self.retired.extend(result.retired.iter().copied());

        if !result.pairs.is_empty() {
            tracing::debug!(
                market = %self.id,
                pricing = self.rule.name(),
                pairs = result.pairs.len(),
                volume = result.volume(),
                "market cleared"
            );
        }
        self.publish_quote(now);

        let mut follow_ups = Vec::new();
        if !notifications.is_empty() {
            follow_ups.push(Scheduled::group(
                When::after(now, self.config.fill_latency),
                notifications,
            ));
        }
        if let MarketType::Call { clear_interval } = self.config.market_type {
            // Off-schedule clears leave the periodic chain alone.
            if self.scheduled_clear == Some(now) {
                follow_ups.extend(self.schedule_next_clear(now, clear_interval));
            }
        }
        Ok(follow_ups)
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    /// Next multiple of `interval` strictly after `now`.
    fn schedule_next_clear(&mut self, now: Timestamp, interval: i64) -> FollowUps {
        let next = Timestamp::new(now.ticks().div_euclid(interval) * interval + interval);
        self.scheduled_clear = Some(next);
        vec![Scheduled::one(
            When::At(next),
            Activity::Clear { market: self.id },
        )]
    }

    fn publish_quote(&mut self, now: Timestamp) {
        let quote = self.book.quote(now);
        let previous = std::mem::replace(&mut self.quote, quote);
        if quote.same_book(&previous) {
            return;
        }
        self.observer.on_event(&MarketEvent::QuoteUpdated {
            market: self.id,
            quote,
        });
        if quote.bid_depth != previous.bid_depth || quote.ask_depth != previous.ask_depth {
            self.observer.on_event(&MarketEvent::DepthChanged {
                market: self.id,
                bid_depth: quote.bid_depth,
                ask_depth: quote.ask_depth,
                time: now,
            });
        }
    }
}
