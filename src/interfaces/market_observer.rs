// ============================================================================
// Market Observer Interface
// Fire-and-forget notifications of market activity
// ============================================================================

use crate::domain::{MarketId, Order, OrderHandle, Quantity, Quote, Timestamp, Transaction};
use parking_lot::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events published by a market
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MarketEvent {
    /// Order accepted into the book
    OrderSubmitted { market: MarketId, order: Order },

    /// Units withdrawn from a resting order (explicitly or by expiry)
    OrderWithdrawn {
        market: MarketId,
        order: OrderHandle,
        quantity: Quantity,
        remaining: Quantity,
        time: Timestamp,
    },

    /// Execution produced by a clear
    Transaction(Transaction),

    /// Quote republished after a book change
    QuoteUpdated { market: MarketId, quote: Quote },

    /// Total resting quantity on either side changed
    DepthChanged {
        market: MarketId,
        bid_depth: Quantity,
        ask_depth: Quantity,
        time: Timestamp,
    },
}

impl MarketEvent {
    pub fn market(&self) -> MarketId {
        match self {
            MarketEvent::OrderSubmitted { market, .. }
            | MarketEvent::OrderWithdrawn { market, .. }
            | MarketEvent::QuoteUpdated { market, .. }
            | MarketEvent::DepthChanged { market, .. } => *market,
            MarketEvent::Transaction(tx) => tx.market,
        }
    }
}

/// Observer trait for market events
///
/// One observer is handed to every market of a replication when it is built;
/// no state is shared between replications. Notifications carry no
/// acknowledgement and are never retried.
pub trait MarketObserver: Send + Sync {
    /// Handle a market event
    fn on_event(&self, event: &MarketEvent);

    /// Batch handler (optional optimization)
    fn on_events(&self, events: &[MarketEvent]) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op observer
pub struct NoOpObserver;

impl MarketObserver for NoOpObserver {
    fn on_event(&self, _event: &MarketEvent) {}
}

/// Logging observer
pub struct LoggingObserver;

impl MarketObserver for LoggingObserver {
    fn on_event(&self, event: &MarketEvent) {
        tracing::debug!("Market event: {:?}", event);
    }
}

/// Keeps every event in arrival order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MarketEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MarketEvent> {
        self.events.lock().clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MarketEvent::Transaction(tx) => Some(tx.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MarketEvent::QuoteUpdated { quote, .. } => Some(*quote),
                _ => None,
            })
            .collect()
    }

    pub fn take(&self) -> Vec<MarketEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl MarketObserver for RecordingObserver {
    fn on_event(&self, event: &MarketEvent) {
        self.events.lock().push(event.clone());
    }

    fn on_events(&self, events: &[MarketEvent]) {
        self.events.lock().extend_from_slice(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_event(bid_depth: Quantity) -> MarketEvent {
        MarketEvent::DepthChanged {
            market: MarketId(1),
            bid_depth,
            ask_depth: 0,
            time: Timestamp::ZERO,
        }
    }

    #[test]
    fn test_noop_observer() {
        NoOpObserver.on_event(&depth_event(1));
        LoggingObserver.on_events(&[depth_event(2)]);
    }

    #[test]
    fn test_recording_observer() {
        let observer = RecordingObserver::new();
        observer.on_event(&depth_event(1));
        observer.on_events(&[
            depth_event(2),
            MarketEvent::QuoteUpdated {
                market: MarketId(1),
                quote: Quote::empty(Timestamp::new(3)),
            },
        ]);

        assert_eq!(observer.len(), 3);
        assert_eq!(observer.quotes().len(), 1);
        assert!(observer.transactions().is_empty());
        assert_eq!(observer.events()[1], depth_event(2));
        assert_eq!(observer.events()[0].market(), MarketId(1));

        assert_eq!(observer.take().len(), 3);
        assert!(observer.is_empty());
    }
}
