// ============================================================================
// Four-Set Order Book
// Resting orders partitioned into matched/unmatched buy/sell sets
// ============================================================================
//
// Matched sets hold the top-priority units of each side that can trade with
// each other right now; unmatched sets hold the rest. An order's quantity may
// be split across its side's two sets (same priority key in both), which keeps
// the matched quantities of both sides exactly equal.
//
// Heads: unmatched sets are read from their best entry, matched sets from
// their worst entry. After every operation:
//   - matched buy quantity == matched sell quantity
//   - worst matched buy price >= worst matched sell price
//   - best unmatched buy price < best unmatched sell price
//   - no unmatched unit outranks a matched unit of the same side

use crate::error::{SimError, SimResult};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::{MatchedPair, Order, OrderHandle, Price, Quantity, Quote, Side, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Priority Keys
// ============================================================================

/// Side-specific priority: `Less` means "trades first".
trait Priority: Ord + Copy + fmt::Debug {
    const SIDE: Side;

    fn of(order: &Order) -> Self;
    fn price(&self) -> Price;
    fn handle(&self) -> OrderHandle;
}

/// Higher price first, then earlier arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuyPriority {
    price: Price,
    handle: OrderHandle,
}

impl Ord for BuyPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .price
            .cmp(&self.price)
            .then(self.handle.cmp(&other.handle))
    }
}

impl PartialOrd for BuyPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Priority for BuyPriority {
    const SIDE: Side = Side::Buy;

    fn of(order: &Order) -> Self {
        Self {
            price: order.price,
            handle: order.handle,
        }
    }

    fn price(&self) -> Price {
        self.price
    }

    fn handle(&self) -> OrderHandle {
        self.handle
    }
}

/// Lower price first, then earlier arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SellPriority {
    price: Price,
    handle: OrderHandle,
}

impl Ord for SellPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.price
            .cmp(&other.price)
            .then(self.handle.cmp(&other.handle))
    }
}

impl PartialOrd for SellPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Priority for SellPriority {
    const SIDE: Side = Side::Sell;

    fn of(order: &Order) -> Self {
        Self {
            price: order.price,
            handle: order.handle,
        }
    }

    fn price(&self) -> Price {
        self.price
    }

    fn handle(&self) -> OrderHandle {
        self.handle
    }
}

// ============================================================================
// One Side of the Book
// ============================================================================

fn take_units<K: Ord + fmt::Debug>(set: &mut BTreeMap<K, Quantity>, key: &K, quantity: Quantity) {
    match set.get_mut(key) {
        Some(slot) => {
            assert!(*slot >= quantity, "four-set entry {:?} underflow", key);
            *slot -= quantity;
            if *slot == 0 {
                set.remove(key);
            }
        },
        None => assert!(quantity == 0, "four-set entry {:?} missing", key),
    }
}

fn adjust_level(levels: &mut BTreeMap<Price, Quantity>, price: Price, delta: Quantity) {
    let slot = levels.entry(price).or_insert(0);
    *slot += delta;
    assert!(*slot >= 0, "negative level quantity at {}", price);
    if *slot == 0 {
        levels.remove(&price);
    }
}

#[derive(Debug, Clone)]
struct SideBook<K: Priority> {
    matched: BTreeMap<K, Quantity>,
    unmatched: BTreeMap<K, Quantity>,
    matched_total: Quantity,
    unmatched_total: Quantity,
    /// Resting quantity per price, both sets combined
    levels: BTreeMap<Price, Quantity>,
}

impl<K: Priority> SideBook<K> {
    fn new() -> Self {
        Self {
            matched: BTreeMap::new(),
            unmatched: BTreeMap::new(),
            matched_total: 0,
            unmatched_total: 0,
            levels: BTreeMap::new(),
        }
    }

    fn matched_worst(&self) -> Option<(K, Quantity)> {
        self.matched.last_key_value().map(|(k, q)| (*k, *q))
    }

    fn unmatched_best(&self) -> Option<(K, Quantity)> {
        self.unmatched.first_key_value().map(|(k, q)| (*k, *q))
    }

    fn depth(&self) -> Quantity {
        self.matched_total + self.unmatched_total
    }

    fn add_unmatched(&mut self, key: K, quantity: Quantity) {
        *self.unmatched.entry(key).or_insert(0) += quantity;
        self.unmatched_total += quantity;
        adjust_level(&mut self.levels, key.price(), quantity);
    }

    fn promote(&mut self, key: K, quantity: Quantity) {
        take_units(&mut self.unmatched, &key, quantity);
        *self.matched.entry(key).or_insert(0) += quantity;
        self.unmatched_total -= quantity;
        self.matched_total += quantity;
    }

    fn demote(&mut self, key: K, quantity: Quantity) {
        take_units(&mut self.matched, &key, quantity);
        *self.unmatched.entry(key).or_insert(0) += quantity;
        self.matched_total -= quantity;
        self.unmatched_total += quantity;
    }

    /// Removes units of one order, unmatched units first.
    fn withdraw(&mut self, key: K, quantity: Quantity) {
        let from_unmatched = self.unmatched.get(&key).copied().unwrap_or(0).min(quantity);
        let from_matched = quantity - from_unmatched;
        take_units(&mut self.unmatched, &key, from_unmatched);
        take_units(&mut self.matched, &key, from_matched);
        self.unmatched_total -= from_unmatched;
        self.matched_total -= from_matched;
        adjust_level(&mut self.levels, key.price(), -quantity);
    }

    /// Exchanges units when an unmatched order outranks the worst matched one.
    fn swap_step(&mut self) -> bool {
        match (self.unmatched_best(), self.matched_worst()) {
            (Some((best, uq)), Some((worst, mq))) if best < worst => {
                let quantity = uq.min(mq);
                self.promote(best, quantity);
                self.demote(worst, quantity);
                true
            },
            _ => false,
        }
    }

    /// Empties the matched set, best entry first.
    fn drain_matched(&mut self) -> Vec<(K, Quantity)> {
        let drained: Vec<_> = std::mem::take(&mut self.matched).into_iter().collect();
        for (key, quantity) in &drained {
            adjust_level(&mut self.levels, key.price(), -quantity);
        }
        self.matched_total = 0;
        drained
    }

    fn matched_of(&self, key: &K) -> Quantity {
        self.matched.get(key).copied().unwrap_or(0)
    }

    fn quantity_at(&self, price: Price) -> Quantity {
        self.levels.get(&price).copied().unwrap_or(0)
    }

    fn top_levels(&self, depth: usize) -> Vec<OrderBookLevel> {
        let to_level = |(price, quantity): (&Price, &Quantity)| OrderBookLevel {
            price: *price,
            quantity: *quantity,
        };
        match K::SIDE {
            Side::Buy => self.levels.iter().rev().take(depth).map(to_level).collect(),
            Side::Sell => self.levels.iter().take(depth).map(to_level).collect(),
        }
    }

    /// Matched entries never rank below unmatched ones.
    fn priority_holds(&self) -> bool {
        match (self.matched_worst(), self.unmatched_best()) {
            (Some((worst, _)), Some((best, _))) => worst <= best,
            _ => true,
        }
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Outcome of [`OrderBook::clear`]
#[derive(Debug, Clone, Default)]
pub struct ClearResult {
    /// Buy/sell pairs, best-priority first on both sides
    pub pairs: Vec<MatchedPair>,
    /// Orders that left the book because they traded fully
    pub retired: Vec<OrderHandle>,
}

impl ClearResult {
    pub fn volume(&self) -> Quantity {
        self.pairs.iter().map(|p| p.quantity).sum()
    }
}

/// Single-market four-set order book
#[derive(Debug, Clone)]
pub struct OrderBook {
    orders: BTreeMap<OrderHandle, Order>,
    buys: SideBook<BuyPriority>,
    sells: SideBook<SellPriority>,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
            buys: SideBook::new(),
            sells: SideBook::new(),
        }
    }

    /// Add an order and restore the four-set invariants.
    pub fn insert(&mut self, order: Order) -> SimResult<()> {
        if order.quantity <= 0 {
            return Err(SimError::InvalidQuantity {
                quantity: order.quantity,
            });
        }
        if self.orders.contains_key(&order.handle) {
            return Err(SimError::InvalidParameter {
                name: "handle",
                value: order.handle.to_string(),
            });
        }

        match order.side {
            Side::Buy => self
                .buys
                .add_unmatched(BuyPriority::of(&order), order.quantity),
            Side::Sell => self
                .sells
                .add_unmatched(SellPriority::of(&order), order.quantity),
        }
        self.orders.insert(order.handle, order);
        self.restore();
        Ok(())
    }

    /// Remove `quantity` units of an order; returns what is left resting.
    pub fn withdraw(&mut self, handle: OrderHandle, quantity: Quantity) -> SimResult<Quantity> {
        if quantity <= 0 {
            return Err(SimError::InvalidQuantity { quantity });
        }
        let order = self
            .orders
            .get_mut(&handle)
            .ok_or(SimError::UnknownOrder(handle))?;
        if quantity > order.quantity {
            return Err(SimError::OverWithdrawal {
                order: handle,
                requested: quantity,
                remaining: order.quantity,
            });
        }

        order.quantity -= quantity;
        let remaining = order.quantity;
        match order.side {
            Side::Buy => self.buys.withdraw(BuyPriority::of(order), quantity),
            Side::Sell => self.sells.withdraw(SellPriority::of(order), quantity),
        }
        if remaining == 0 {
            self.orders.remove(&handle);
        }

        self.restore();
        Ok(remaining)
    }

    /// Pair off every matched unit and empty the matched sets.
    ///
    /// Both sides are walked best-first (price, then arrival); each pair
    /// trades the smaller of the two remaining matched quantities.
    pub fn clear(&mut self) -> ClearResult {
        let buys = self.buys.drain_matched();
        let sells = self.sells.drain_matched();

        let mut pairs = Vec::new();
        let mut buy_iter = buys.iter().copied();
        let mut sell_iter = sells.iter().copied();
        let mut buy = buy_iter.next();
        let mut sell = sell_iter.next();

        while let (Some((bk, bq)), Some((sk, sq))) = (buy, sell) {
            let quantity = bq.min(sq);
            pairs.push(MatchedPair {
                buy: self.orders[&bk.handle()].clone(),
                sell: self.orders[&sk.handle()].clone(),
                quantity,
            });
            buy = if bq > quantity {
                Some((bk, bq - quantity))
            } else {
                buy_iter.next()
            };
            sell = if sq > quantity {
                Some((sk, sq - quantity))
            } else {
                sell_iter.next()
            };
        }
        assert!(
            buy.is_none() && sell.is_none(),
            "matched sets out of balance at clear"
        );

        let mut retired = Vec::new();
        let traded = buys
            .iter()
            .map(|(k, q)| (k.handle(), *q))
            .chain(sells.iter().map(|(k, q)| (k.handle(), *q)));
        for (handle, quantity) in traded {
            if let Some(order) = self.orders.get_mut(&handle) {
                order.quantity -= quantity;
                if order.quantity == 0 {
                    self.orders.remove(&handle);
                    retired.push(handle);
                }
            }
        }

        self.assert_invariants();
        ClearResult { pairs, retired }
    }

    // ========================================================================
    // Invariant Restoration
    // ========================================================================

    fn restore(&mut self) {
        loop {
            if self.balance_step() {
                continue;
            }
            if self.buys.swap_step() || self.sells.swap_step() {
                continue;
            }
            if self.cross_step() {
                continue;
            }
            break;
        }
        self.assert_invariants();
    }

    /// Evens out matched quantities after a withdrawal: promote a crossing
    /// order on the light side, else demote from the heavy side.
    fn balance_step(&mut self) -> bool {
        let surplus = self.buys.matched_total - self.sells.matched_total;
        match surplus.cmp(&0) {
            Ordering::Equal => false,
            Ordering::Greater => {
                let Some((worst_buy, worst_qty)) = self.buys.matched_worst() else {
                    unreachable!("buy surplus with no matched buys")
                };
                match self.sells.unmatched_best() {
                    Some((best_sell, qty)) if best_sell.price() <= worst_buy.price() => {
                        self.sells.promote(best_sell, qty.min(surplus));
                    },
                    _ => self.buys.demote(worst_buy, worst_qty.min(surplus)),
                }
                true
            },
            Ordering::Less => {
                let deficit = -surplus;
                let Some((worst_sell, worst_qty)) = self.sells.matched_worst() else {
                    unreachable!("sell surplus with no matched sells")
                };
                match self.buys.unmatched_best() {
                    Some((best_buy, qty)) if best_buy.price() >= worst_sell.price() => {
                        self.buys.promote(best_buy, qty.min(deficit));
                    },
                    _ => self.sells.demote(worst_sell, worst_qty.min(deficit)),
                }
                true
            },
        }
    }

    /// Matches the best unmatched buy and sell while they cross.
    fn cross_step(&mut self) -> bool {
        match (self.buys.unmatched_best(), self.sells.unmatched_best()) {
            (Some((buy, bq)), Some((sell, sq))) if buy.price() >= sell.price() => {
                let quantity = bq.min(sq);
                self.buys.promote(buy, quantity);
                self.sells.promote(sell, quantity);
                true
            },
            _ => false,
        }
    }

    fn assert_invariants(&self) {
        assert_eq!(
            self.buys.matched_total, self.sells.matched_total,
            "matched quantities out of balance"
        );
        if let (Some((buy, _)), Some((sell, _))) =
            (self.buys.matched_worst(), self.sells.matched_worst())
        {
            assert!(
                buy.price() >= sell.price(),
                "matched buy {} below matched sell {}",
                buy.price(),
                sell.price()
            );
        }
        if let (Some((buy, _)), Some((sell, _))) =
            (self.buys.unmatched_best(), self.sells.unmatched_best())
        {
            assert!(
                buy.price() < sell.price(),
                "unmatched buy {} crosses unmatched sell {}",
                buy.price(),
                sell.price()
            );
        }
        assert!(self.buys.priority_holds(), "unmatched buy outranks matched");
        assert!(self.sells.priority_holds(), "unmatched sell outranks matched");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// max(best unmatched buy, worst matched sell)
    pub fn best_bid(&self) -> Option<Price> {
        let unmatched = self.buys.unmatched_best().map(|(k, _)| k.price());
        let matched = self.sells.matched_worst().map(|(k, _)| k.price());
        unmatched.max(matched)
    }

    /// min(best unmatched sell, worst matched buy)
    pub fn best_ask(&self) -> Option<Price> {
        let unmatched = self.sells.unmatched_best().map(|(k, _)| k.price());
        let matched = self.buys.matched_worst().map(|(k, _)| k.price());
        match (unmatched, matched) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn quote(&self, time: Timestamp) -> Quote {
        let bid = self.best_bid();
        let ask = self.best_ask();
        Quote {
            bid,
            bid_quantity: bid.map_or(0, |p| self.buys.quantity_at(p)),
            ask,
            ask_quantity: ask.map_or(0, |p| self.sells.quantity_at(p)),
            bid_depth: self.buys.depth(),
            ask_depth: self.sells.depth(),
            time,
        }
    }

    pub fn get(&self, handle: OrderHandle) -> Option<&Order> {
        self.orders.get(&handle)
    }

    pub fn contains(&self, handle: OrderHandle) -> bool {
        self.orders.contains_key(&handle)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Quantity that would trade if the book cleared now (per side).
    pub fn matched_quantity(&self) -> Quantity {
        self.buys.matched_total
    }

    /// Matched part of one order's remaining quantity.
    pub fn matched_quantity_of(&self, handle: OrderHandle) -> Quantity {
        match self.orders.get(&handle) {
            Some(order) if order.is_buy() => self.buys.matched_of(&BuyPriority::of(order)),
            Some(order) => self.sells.matched_of(&SellPriority::of(order)),
            None => 0,
        }
    }

    pub fn depth(&self, side: Side) -> Quantity {
        match side {
            Side::Buy => self.buys.depth(),
            Side::Sell => self.sells.depth(),
        }
    }

    pub fn quantity_at(&self, side: Side, price: Price) -> Quantity {
        match side {
            Side::Buy => self.buys.quantity_at(price),
            Side::Sell => self.sells.quantity_at(price),
        }
    }

    pub fn snapshot(&self, depth: usize, time: Timestamp) -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: self.buys.top_levels(depth),
            asks: self.sells.top_levels(depth),
            time,
        }
    }

    /// Full scan of the bookkeeping; used by tests.
    pub fn check_consistency(&self) -> Result<(), String> {
        fn check_side<K: Priority>(
            side: &SideBook<K>,
            orders: &BTreeMap<OrderHandle, Order>,
        ) -> Result<(), String> {
            let mut per_order: BTreeMap<OrderHandle, Quantity> = BTreeMap::new();
            let mut per_level: BTreeMap<Price, Quantity> = BTreeMap::new();
            for (key, qty) in side.matched.iter().chain(side.unmatched.iter()) {
                if *qty <= 0 {
                    return Err(format!("non-positive entry {:?}", key));
                }
                *per_order.entry(key.handle()).or_insert(0) += qty;
                *per_level.entry(key.price()).or_insert(0) += qty;
            }
            if side.matched.values().sum::<Quantity>() != side.matched_total {
                return Err(format!("{:?} matched total drifted", K::SIDE));
            }
            if side.unmatched.values().sum::<Quantity>() != side.unmatched_total {
                return Err(format!("{:?} unmatched total drifted", K::SIDE));
            }
            if per_level != side.levels {
                return Err(format!("{:?} price levels drifted", K::SIDE));
            }
            for (handle, qty) in per_order {
                match orders.get(&handle) {
                    Some(order) if order.side == K::SIDE && order.quantity == qty => {},
                    Some(order) => {
                        return Err(format!(
                            "order {} rests {} but records {}",
                            handle, qty, order.quantity
                        ))
                    },
                    None => return Err(format!("order {} rests but is unknown", handle)),
                }
            }
            Ok(())
        }

        check_side(&self.buys, &self.orders)?;
        check_side(&self.sells, &self.orders)?;
        let resting: Quantity = self.orders.values().map(|o| o.quantity).sum();
        if resting != self.buys.depth() + self.sells.depth() {
            return Err("orders missing from the four sets".to_string());
        }
        if self.orders.values().any(|o| o.quantity <= 0) {
            return Err("order with non-positive quantity kept".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookLevel {
    pub price: Price,
    pub quantity: Quantity,
}

/// Aggregated price levels, best first on each side
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub time: Timestamp,
}

impl OrderBookSnapshot {
    pub fn highest_bid_level(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn lowest_ask_level(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|l| l.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;
    use proptest::prelude::*;

    struct Feed {
        book: OrderBook,
        next: u64,
    }

    impl Feed {
        fn new() -> Self {
            Self {
                book: OrderBook::new(),
                next: 0,
            }
        }

        fn submit(&mut self, side: Side, price: i64, quantity: Quantity) -> OrderHandle {
            self.next += 1;
            let handle = OrderHandle::new(self.next);
            self.book
                .insert(Order::new(
                    handle,
                    OwnerId(self.next as u32),
                    side,
                    Price::new(price),
                    quantity,
                    Timestamp::ZERO,
                ))
                .unwrap();
            handle
        }
    }

    #[test]
    fn test_simple_cross_is_matched() {
        let mut feed = Feed::new();
        let buy = feed.submit(Side::Buy, 110, 1);
        let sell = feed.submit(Side::Sell, 100, 1);

        assert_eq!(feed.book.matched_quantity(), 1);
        assert_eq!(feed.book.matched_quantity_of(buy), 1);
        assert_eq!(feed.book.matched_quantity_of(sell), 1);

        let result = feed.book.clear();
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.volume(), 1);
        assert_eq!(result.retired, vec![buy, sell]);
        assert!(feed.book.is_empty());
        assert!(feed.book.quote(Timestamp::ZERO).is_empty());
    }

    #[test]
    fn test_split_order_leaves_residual() {
        let mut feed = Feed::new();
        feed.submit(Side::Sell, 100, 2);
        let buy = feed.submit(Side::Buy, 150, 5);

        assert_eq!(feed.book.matched_quantity_of(buy), 2);
        let quote = feed.book.quote(Timestamp::ZERO);
        assert_eq!(quote.bid, Some(Price::new(150)));
        assert_eq!(quote.ask, Some(Price::new(150)));

        let result = feed.book.clear();
        assert_eq!(result.volume(), 2);
        assert_eq!(feed.book.get(buy).unwrap().quantity, 3);

        let quote = feed.book.quote(Timestamp::ZERO);
        assert_eq!(quote.bid, Some(Price::new(150)));
        assert_eq!(quote.bid_quantity, 3);
        assert_eq!(quote.ask, None);
        feed.book.check_consistency().unwrap();
    }

    #[test]
    fn test_better_order_displaces_worst_matched() {
        let mut feed = Feed::new();
        let low = feed.submit(Side::Buy, 101, 1);
        feed.submit(Side::Sell, 100, 1);
        let high = feed.submit(Side::Buy, 105, 1);

        assert_eq!(feed.book.matched_quantity_of(high), 1);
        assert_eq!(feed.book.matched_quantity_of(low), 0);
        assert_eq!(feed.book.best_bid(), Some(Price::new(101)));
        feed.book.check_consistency().unwrap();
    }

    #[test]
    fn test_price_time_priority_on_same_level() {
        let mut feed = Feed::new();
        let first = feed.submit(Side::Sell, 100, 1);
        let second = feed.submit(Side::Sell, 100, 1);
        feed.submit(Side::Buy, 100, 1);

        let result = feed.book.clear();
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].sell.handle, first);
        assert!(feed.book.contains(second));
    }

    #[test]
    fn test_withdraw_matched_unit_rebalances() {
        let mut feed = Feed::new();
        let buy = feed.submit(Side::Buy, 110, 2);
        let sell = feed.submit(Side::Sell, 100, 2);
        assert_eq!(feed.book.matched_quantity(), 2);

        assert_eq!(feed.book.withdraw(buy, 1).unwrap(), 1);
        assert_eq!(feed.book.matched_quantity(), 1);
        assert_eq!(feed.book.matched_quantity_of(sell), 1);

        let result = feed.book.clear();
        assert_eq!(result.volume(), 1);
        let quote = feed.book.quote(Timestamp::ZERO);
        assert_eq!(quote.ask, Some(Price::new(100)));
        assert_eq!(quote.ask_quantity, 1);
        assert_eq!(quote.bid, None);
    }

    #[test]
    fn test_withdraw_promotes_replacement() {
        let mut feed = Feed::new();
        let a = feed.submit(Side::Sell, 95, 1);
        feed.submit(Side::Sell, 98, 1);
        feed.submit(Side::Buy, 100, 1);

        feed.book.withdraw(a, 1).unwrap();
        assert!(!feed.book.contains(a));
        assert_eq!(feed.book.matched_quantity(), 1);
        let result = feed.book.clear();
        assert_eq!(result.pairs[0].sell.price, Price::new(98));
    }

    #[test]
    fn test_precondition_failures() {
        let mut feed = Feed::new();
        let buy = feed.submit(Side::Buy, 100, 2);

        let zero = Order::new(
            OrderHandle::new(99),
            OwnerId(0),
            Side::Sell,
            Price::new(100),
            0,
            Timestamp::ZERO,
        );
        assert_eq!(
            feed.book.insert(zero),
            Err(SimError::InvalidQuantity { quantity: 0 })
        );
        assert!(matches!(
            feed.book.withdraw(buy, 3),
            Err(SimError::OverWithdrawal { remaining: 2, .. })
        ));
        assert_eq!(
            feed.book.withdraw(buy, 0),
            Err(SimError::InvalidQuantity { quantity: 0 })
        );
        assert_eq!(
            feed.book.withdraw(OrderHandle::new(77), 1),
            Err(SimError::UnknownOrder(OrderHandle::new(77)))
        );
        assert_eq!(feed.book.get(buy).unwrap().quantity, 2);
    }

    #[test]
    fn test_snapshot_levels() {
        let mut feed = Feed::new();
        feed.submit(Side::Buy, 99, 2);
        feed.submit(Side::Buy, 98, 1);
        feed.submit(Side::Buy, 99, 1);
        feed.submit(Side::Sell, 101, 4);

        let snapshot = feed.book.snapshot(5, Timestamp::new(3));
        assert_eq!(snapshot.highest_bid_level(), Some(Price::new(99)));
        assert_eq!(snapshot.bids[0].quantity, 3);
        assert_eq!(snapshot.total_bid_quantity(), 4);
        assert_eq!(snapshot.lowest_ask_level(), Some(Price::new(101)));
        assert_eq!(feed.book.depth(Side::Sell), 4);
    }

    // ------------------------------------------------------------------------
    // Property tests
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Op {
        Insert { buy: bool, price: i64, quantity: Quantity },
        Withdraw { pick: usize, quantity: Quantity },
        Clear,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (any::<bool>(), 90i64..=110, 1i64..=5)
                .prop_map(|(buy, price, quantity)| Op::Insert { buy, price, quantity }),
            3 => (any::<usize>(), 1i64..=5)
                .prop_map(|(pick, quantity)| Op::Withdraw { pick, quantity }),
            1 => Just(Op::Clear),
        ]
    }

    /// Largest q such that the q-th best buy unit still crosses the q-th
    /// best sell unit.
    fn max_volume(book: &OrderBook) -> Quantity {
        let mut buys: Vec<i64> = Vec::new();
        let mut sells: Vec<i64> = Vec::new();
        for order in book.orders() {
            let units = std::iter::repeat(order.price.units()).take(order.quantity as usize);
            match order.side {
                Side::Buy => buys.extend(units),
                Side::Sell => sells.extend(units),
            }
        }
        buys.sort_unstable_by(|a, b| b.cmp(a));
        sells.sort_unstable();
        buys.iter()
            .zip(sells.iter())
            .take_while(|(b, s)| b >= s)
            .count() as Quantity
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_after_every_operation(
            ops in prop::collection::vec(op_strategy(), 1..60)
        ) {
            let mut feed = Feed::new();
            for op in ops {
                match op {
                    Op::Insert { buy, price, quantity } => {
                        let side = if buy { Side::Buy } else { Side::Sell };
                        feed.submit(side, price, quantity);
                    }
                    Op::Withdraw { pick, quantity } => {
                        let live: Vec<_> = feed.book.orders().map(|o| (o.handle, o.quantity)).collect();
                        if live.is_empty() {
                            continue;
                        }
                        let (handle, remaining) = live[pick % live.len()];
                        feed.book.withdraw(handle, quantity.min(remaining)).unwrap();
                    }
                    Op::Clear => {
                        let expected = feed.book.matched_quantity();
                        let result = feed.book.clear();
                        prop_assert_eq!(result.volume(), expected);
                        for pair in &result.pairs {
                            prop_assert!(pair.buy.price >= pair.sell.price);
                            prop_assert!(pair.quantity > 0);
                        }
                        let quote = feed.book.quote(Timestamp::ZERO);
                        if let (Some(bid), Some(ask)) = (quote.bid, quote.ask) {
                            prop_assert!(bid < ask);
                        }
                    }
                }

                prop_assert!(feed.book.check_consistency().is_ok(), "{:?}", feed.book.check_consistency());
                prop_assert_eq!(feed.book.matched_quantity(), max_volume(&feed.book));
                let quote = feed.book.quote(Timestamp::ZERO);
                if let (Some(bid), Some(ask)) = (quote.bid, quote.ask) {
                    prop_assert!(bid <= ask);
                }
                if feed.book.is_empty() {
                    prop_assert!(quote.is_empty());
                }
            }
        }

        #[test]
        fn prop_clear_pairs_respect_priority(
            sells in prop::collection::vec((95i64..=100, 1i64..=3), 1..8),
            buy_qty in 1i64..=10,
        ) {
            let mut feed = Feed::new();
            for (price, quantity) in &sells {
                feed.submit(Side::Sell, *price, *quantity);
            }
            feed.submit(Side::Buy, 100, buy_qty);
            let result = feed.book.clear();

            // Sell side of the pairs is walked best-first.
            let keys: Vec<_> = result.pairs.iter().map(|p| (p.sell.price, p.sell.handle)).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);

            // Every remaining sell ranks after every sell that traded.
            if let Some(last) = result.pairs.last() {
                for order in feed.book.orders().filter(|o| o.side == Side::Sell) {
                    prop_assert!((order.price, order.handle) >= (last.sell.price, last.sell.handle));
                }
            }
        }
    }
}
