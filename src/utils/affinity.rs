// ============================================================================
// CPU Affinity
// Optional pinning of replication workers to cores
// ============================================================================
//
// Replications are CPU-bound and share nothing, so a worker that stays on
// one core keeps its order books and clock buckets warm in cache. Pinning
// only helps while there are no more workers than cores.
// ============================================================================

/// Cores the harness may pin workers to, in ascending id order.
#[cfg(feature = "numa")]
pub fn available_cores() -> Vec<usize> {
    let mut ids: Vec<usize> = core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Pin the calling thread to the core assigned to `worker`.
///
/// Workers wrap around the available cores. Returns false when no core
/// could be pinned.
#[cfg(feature = "numa")]
pub fn pin_worker(worker: usize) -> bool {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    if cores.is_empty() {
        return false;
    }
    core_affinity::set_for_current(cores[worker % cores.len()])
}

// ============================================================================
// Stub implementations when numa feature is disabled
// ============================================================================

#[cfg(not(feature = "numa"))]
pub fn available_cores() -> Vec<usize> {
    let count = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    (0..count).collect()
}

/// No-op without the `numa` feature.
#[cfg(not(feature = "numa"))]
pub fn pin_worker(_worker: usize) -> bool {
    false
}
