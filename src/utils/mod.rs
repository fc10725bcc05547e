// ============================================================================
// Utilities Module
// Worker placement and log setup
// ============================================================================

mod affinity;

pub use affinity::{available_cores, pin_worker};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (for example `"double_auction_sim=info"`).
///
/// Returns false if a global subscriber was already installed.
#[cfg(feature = "logging")]
pub fn init_logging(default_filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
