// ============================================================================
// Price Oracle Interface
// Read-only valuation used for end-of-run liquidation
// ============================================================================

use crate::domain::{Price, Timestamp};
use crate::error::{SimError, SimResult};
use std::collections::BTreeMap;

/// Time-indexed value of the traded asset. Never consulted for matching.
pub trait PriceOracle: Send + Sync {
    fn value_at(&self, time: Timestamp) -> Price;
}

/// Same value at every time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantOracle(pub Price);

impl PriceOracle for ConstantOracle {
    fn value_at(&self, _time: Timestamp) -> Price {
        self.0
    }
}

/// Step function over recorded points.
///
/// The value at `t` is the latest point at or before `t`; times before the
/// first point take the first value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesOracle {
    points: BTreeMap<Timestamp, Price>,
}

impl TimeSeriesOracle {
    pub fn new(points: impl IntoIterator<Item = (Timestamp, Price)>) -> SimResult<Self> {
        let points: BTreeMap<_, _> = points.into_iter().collect();
        if points.is_empty() {
            return Err(SimError::InvalidConfig(
                "Price series needs at least one point".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl PriceOracle for TimeSeriesOracle {
    fn value_at(&self, time: Timestamp) -> Price {
        self.points
            .range(..=time)
            .next_back()
            .or_else(|| self.points.iter().next())
            .map(|(_, price)| *price)
            .unwrap_or_default()
    }
}
