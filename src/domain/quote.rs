// ============================================================================
// Quote
// ============================================================================

use super::{Price, Quantity, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Immutable best bid/ask snapshot, republished after every book change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Quote {
    pub bid: Option<Price>,
    /// Resting buy quantity at exactly `bid`
    pub bid_quantity: Quantity,
    pub ask: Option<Price>,
    /// Resting sell quantity at exactly `ask`
    pub ask_quantity: Quantity,
    /// Total resting buy quantity
    pub bid_depth: Quantity,
    /// Total resting sell quantity
    pub ask_depth: Quantity,
    pub time: Timestamp,
}

impl Quote {
    pub fn empty(time: Timestamp) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bid.is_none() && self.ask.is_none()
    }

    pub fn is_defined(&self) -> bool {
        self.bid.is_some() && self.ask.is_some()
    }

    /// Ask minus bid, when both sides are present.
    pub fn spread(&self) -> Option<i64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask.units() - bid.units()),
            _ => None,
        }
    }

    pub fn midquote(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid.units() as f64 + ask.units() as f64) / 2.0),
            _ => None,
        }
    }

    /// Same prices and quantities, ignoring the publication time.
    pub fn same_book(&self, other: &Quote) -> bool {
        Quote {
            time: other.time,
            ..*self
        } == *other
    }
}
