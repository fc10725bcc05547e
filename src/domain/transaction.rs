// ============================================================================
// Transaction Domain Model
// ============================================================================

use super::{MarketId, Order, OrderHandle, OwnerId, Price, Quantity, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One buy and one sell paired by a clear, before pricing.
///
/// Carries snapshots of both orders as they stood when the batch was cut;
/// `quantity` is the executable amount for this pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub buy: Order,
    pub sell: Order,
    pub quantity: Quantity,
}

impl MatchedPair {
    /// Whichever of the two orders arrived first.
    pub fn earliest(&self) -> &Order {
        if self.buy.arrived_before(&self.sell) {
            &self.buy
        } else {
            &self.sell
        }
    }
}

/// Immutable record of an execution
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    pub market: MarketId,
    pub buyer: OwnerId,
    pub seller: OwnerId,
    pub buy_order: OrderHandle,
    pub sell_order: OrderHandle,
    pub price: Price,
    pub quantity: Quantity,
    pub time: Timestamp,
}

impl Transaction {
    pub fn from_pair(market: MarketId, pair: &MatchedPair, price: Price, time: Timestamp) -> Self {
        Self {
            market,
            buyer: pair.buy.owner,
            seller: pair.sell.owner,
            buy_order: pair.buy.handle,
            sell_order: pair.sell.handle,
            price,
            quantity: pair.quantity,
            time,
        }
    }

    /// Cash that changes hands (price * quantity)
    pub fn notional_value(&self) -> i64 {
        self.price.notional(self.quantity)
    }
}
