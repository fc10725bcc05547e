// ============================================================================
// Simulation Errors
// Precondition failures raised by the book, markets, clock and harness
// ============================================================================

use crate::domain::{MarketId, OrderHandle, Quantity, Timestamp};
use std::fmt;

/// Errors raised when a caller violates a precondition.
///
/// None of these are ever corrected silently: a replication that hits one is
/// aborted, since replaying it with the same seed reproduces the same fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Submitted or withdrawn quantity was zero or negative
    InvalidQuantity { quantity: Quantity },
    /// Tried to withdraw more than the order still has resting
    OverWithdrawal {
        order: OrderHandle,
        requested: Quantity,
        remaining: Quantity,
    },
    /// Order is not resting in the book
    UnknownOrder(OrderHandle),
    /// Market id does not belong to this simulation
    UnknownMarket(MarketId),
    /// Participant index does not belong to this simulation
    UnknownParticipant(usize),
    /// Activity scheduled before the clock's current time
    ScheduleInPast { at: Timestamp, now: Timestamp },
    /// Numeric parameter outside its allowed range
    InvalidParameter { name: &'static str, value: String },
    /// Configuration rejected by `validate()`
    InvalidConfig(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidQuantity { quantity } => {
                write!(f, "quantity must be positive, got {}", quantity)
            },
            SimError::OverWithdrawal {
                order,
                requested,
                remaining,
            } => write!(
                f,
                "cannot withdraw {} from order {}: only {} remaining",
                requested, order, remaining
            ),
            SimError::UnknownOrder(order) => write!(f, "order {} is not in the book", order),
            SimError::UnknownMarket(id) => write!(f, "unknown market {}", id),
            SimError::UnknownParticipant(idx) => write!(f, "unknown participant {}", idx),
            SimError::ScheduleInPast { at, now } => {
                write!(f, "cannot schedule at {} before current time {}", at, now)
            },
            SimError::InvalidParameter { name, value } => {
                write!(f, "parameter {} out of range: {}", name, value)
            },
            SimError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for SimError {}

/// Result type alias for simulation operations
pub type SimResult<T> = Result<T, SimError>;

/// Batch-level failures of the replication harness.
///
/// Any of these aborts the whole batch: results past the failing index are
/// never emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// A replication returned an error
    ReplicationFailed { index: usize, source: SimError },
    /// A replication panicked
    WorkerPanicked { index: usize },
    /// The sink refused an observation
    SinkFailed(String),
    InvalidConfig(String),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::ReplicationFailed { index, source } => {
                write!(f, "replication {} failed: {}", index, source)
            },
            HarnessError::WorkerPanicked { index } => {
                write!(f, "worker panicked during replication {}", index)
            },
            HarnessError::SinkFailed(reason) => write!(f, "observation sink failed: {}", reason),
            HarnessError::InvalidConfig(reason) => {
                write!(f, "invalid harness configuration: {}", reason)
            },
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::ReplicationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SimError::InvalidQuantity { quantity: 0 }.to_string(),
            "quantity must be positive, got 0"
        );
        assert_eq!(
            SimError::ScheduleInPast {
                at: Timestamp::new(3),
                now: Timestamp::new(5),
            }
            .to_string(),
            "cannot schedule at 3 before current time 5"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            SimError::UnknownOrder(OrderHandle::new(1)),
            SimError::UnknownOrder(OrderHandle::new(1))
        );
        assert_ne!(
            SimError::UnknownOrder(OrderHandle::new(1)),
            SimError::UnknownOrder(OrderHandle::new(2))
        );
    }

    #[test]
    fn test_harness_error_source() {
        use std::error::Error;

        let err = HarnessError::ReplicationFailed {
            index: 4,
            source: SimError::UnknownMarket(MarketId(2)),
        };
        assert_eq!(
            err.to_string(),
            "replication 4 failed: unknown market market-2"
        );
        assert!(err.source().is_some());
        assert!(HarnessError::WorkerPanicked { index: 1 }.source().is_none());
    }
}
