// ============================================================================
// Clock Module
// Discrete-event scheduling for one replication
// ============================================================================

mod event_queue;

pub use event_queue::{ActivityId, Clock, Scheduled};
