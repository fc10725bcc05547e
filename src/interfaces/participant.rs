// ============================================================================
// Participant Interface
// Hook for agent code acting on the markets of one replication
// ============================================================================

use crate::domain::Transaction;
use crate::error::SimResult;
use crate::simulation::MarketAccess;

/// Agent acting on the markets at simulated instants.
///
/// Calls through `MarketAccess` happen synchronously at the current time.
/// Fills are never returned from `submit_order`; they arrive later through
/// `on_fill`, after the market's fill latency.
pub trait Participant: Send {
    /// Called whenever a scheduled wake-up for this participant executes
    fn on_wake(&mut self, market: &mut MarketAccess<'_>) -> SimResult<()>;

    /// Called once per execution involving one of this participant's orders
    fn on_fill(&mut self, market: &mut MarketAccess<'_>, fill: &Transaction) -> SimResult<()> {
        let _ = (market, fill);
        Ok(())
    }

    fn name(&self) -> &str {
        "participant"
    }
}
