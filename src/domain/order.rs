// ============================================================================
// Order Domain Model
// ============================================================================

use rust_decimal::Decimal;
use std::fmt;

use super::Timestamp;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

/// Signed unit count. Resting quantities are always positive.
pub type Quantity = i64;

/// Limit price in integer price units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Price(i64);

impl Price {
    pub const fn new(units: i64) -> Self {
        Self(units)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }

    /// Notional value of `quantity` units at this price.
    pub fn notional(self, quantity: Quantity) -> i64 {
        self.0.saturating_mul(quantity)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Price {
    fn from(units: i64) -> Self {
        Self(units)
    }
}

/// Strictly monotonic per-market arrival key. Doubles as the order's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderHandle(u64);

impl OrderHandle {
    pub const fn new(arrival: u64) -> Self {
        Self(arrival)
    }

    pub const fn arrival(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque identity of whoever submitted an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnerId(pub u32);

impl OwnerId {
    /// First id of the range reserved for registered participants.
    /// Lower ids belong to external order flow.
    pub const PARTICIPANT_BASE: u32 = 1 << 31;

    /// Owner id of the participant registered at `index`
    pub fn participant(index: usize) -> Self {
        OwnerId(Self::PARTICIPANT_BASE + index as u32)
    }

    /// Registration index, if this id is in the participant range
    pub fn participant_index(&self) -> Option<usize> {
        self.0
            .checked_sub(Self::PARTICIPANT_BASE)
            .map(|i| i as usize)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Index of a market within one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarketId(pub u32);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// True when a `self`-side order at `price` can trade against `other`.
    pub fn crosses(self, price: Price, other: Price) -> bool {
        match self {
            Side::Buy => price >= other,
            Side::Sell => price <= other,
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// Resting limit order.
///
/// `quantity` is what remains to be traded; the book drops the order at the
/// exact moment it reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub handle: OrderHandle,
    pub owner: OwnerId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub submitted_at: Timestamp,
}

impl Order {
    pub fn new(
        handle: OrderHandle,
        owner: OwnerId,
        side: Side,
        price: Price,
        quantity: Quantity,
        submitted_at: Timestamp,
    ) -> Self {
        Self {
            handle,
            owner,
            side,
            price,
            quantity,
            submitted_at,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    /// Whether this order arrived before `other` in the same market.
    pub fn arrived_before(&self, other: &Order) -> bool {
        self.handle < other.handle
    }
}
