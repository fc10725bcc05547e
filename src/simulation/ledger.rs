// ============================================================================
// Ledger
// Cash and holdings per owner, updated on every transaction
// ============================================================================

use crate::domain::{OwnerId, Price, Quantity, Transaction};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Account {
    pub cash: i64,
    pub holdings: Quantity,
}

impl Account {
    /// Cash plus holdings liquidated at `value`
    pub fn liquidation_value(&self, value: Price) -> i64 {
        self.cash.saturating_add(value.notional(self.holdings))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: BTreeMap<OwnerId, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buyer pays `price * quantity` and receives the units; seller the reverse.
    pub fn apply(&mut self, tx: &Transaction) {
        let notional = tx.notional_value();

        let buyer = self.accounts.entry(tx.buyer).or_default();
        buyer.cash -= notional;
        buyer.holdings += tx.quantity;

        let seller = self.accounts.entry(tx.seller).or_default();
        seller.cash += notional;
        seller.holdings -= tx.quantity;
    }

    pub fn account(&self, owner: OwnerId) -> Account {
        self.accounts.get(&owner).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (OwnerId, Account)> + '_ {
        self.accounts.iter().map(|(owner, account)| (*owner, *account))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketId, OrderHandle, Timestamp};

    fn tx(buyer: u32, seller: u32, price: i64, quantity: Quantity) -> Transaction {
        Transaction {
            market: MarketId(0),
            buyer: OwnerId(buyer),
            seller: OwnerId(seller),
            buy_order: OrderHandle::new(1),
            sell_order: OrderHandle::new(2),
            price: Price::new(price),
            quantity,
            time: Timestamp::ZERO,
        }
    }

    #[test]
    fn test_transaction_moves_cash_and_units() {
        let mut ledger = Ledger::new();
        ledger.apply(&tx(1, 2, 105, 2));

        assert_eq!(
            ledger.account(OwnerId(1)),
            Account {
                cash: -210,
                holdings: 2
            }
        );
        assert_eq!(
            ledger.account(OwnerId(2)),
            Account {
                cash: 210,
                holdings: -2
            }
        );
        assert_eq!(ledger.account(OwnerId(9)), Account::default());
    }

    #[test]
    fn test_liquidation_is_zero_sum_at_trade_price() {
        let mut ledger = Ledger::new();
        ledger.apply(&tx(1, 2, 100, 3));
        ledger.apply(&tx(2, 3, 90, 1));

        let total: i64 = ledger
            .accounts()
            .map(|(_, a)| a.liquidation_value(Price::new(120)))
            .sum();
        assert_eq!(total, 0);
        assert_eq!(ledger.account(OwnerId(1)).liquidation_value(Price::new(120)), 60);
    }
}
