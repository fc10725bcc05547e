// ============================================================================
// Activity
// Deferred work items executed by the clock
// ============================================================================

use super::{MarketId, OrderHandle, OwnerId, Price, Quantity, Side, Transaction};

/// One unit of scheduled work inside a replication
#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    /// Place a limit order, optionally expiring `duration` ticks later
    SubmitOrder {
        market: MarketId,
        owner: OwnerId,
        side: Side,
        price: Price,
        quantity: Quantity,
        duration: Option<i64>,
    },

    /// Withdraw part of an order, or all of it when `quantity` is `None`
    WithdrawOrder {
        market: MarketId,
        order: OrderHandle,
        quantity: Option<Quantity>,
    },

    /// Withdraw whatever is left of an order whose duration ran out
    Expire { market: MarketId, order: OrderHandle },

    /// Clear the market's matched orders
    Clear { market: MarketId },

    /// Give a participant a chance to act
    Wake { participant: usize },

    /// Tell an owner about one of its executions
    NotifyFill {
        owner: OwnerId,
        transaction: Transaction,
    },
}

impl Activity {
    /// Market this activity operates on, if any
    pub fn market(&self) -> Option<MarketId> {
        match self {
            Activity::SubmitOrder { market, .. }
            | Activity::WithdrawOrder { market, .. }
            | Activity::Expire { market, .. }
            | Activity::Clear { market } => Some(*market),
            Activity::NotifyFill { transaction, .. } => Some(transaction.market),
            Activity::Wake { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_of_activity() {
        assert_eq!(
            Activity::Clear { market: MarketId(2) }.market(),
            Some(MarketId(2))
        );
        assert_eq!(Activity::Wake { participant: 0 }.market(), None);
    }
}
