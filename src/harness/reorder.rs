// ============================================================================
// Reorder Buffer
// Bounded min-heap that turns out-of-order completions into in-order output
// ============================================================================

use super::{HarnessError, ObservationSink};
use parking_lot::{Condvar, Mutex};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A finished replication waiting for its predecessors
struct Pending<T> {
    index: usize,
    value: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

struct State<T, S> {
    /// Index the sink expects next
    next: usize,
    held: BinaryHeap<Reverse<Pending<T>>>,
    sink: S,
    /// First failure; once set nothing else is emitted
    failure: Option<HarnessError>,
}

/// Shared between all workers of one batch.
///
/// Emission to the sink happens under the same lock as insertion, so the
/// sink sees indices strictly in order and never concurrently.
pub(crate) struct ReorderBuffer<T, S> {
    state: Mutex<State<T, S>>,
    space: Condvar,
    capacity: usize,
}

impl<T, S: ObservationSink<T>> ReorderBuffer<T, S> {
    pub(crate) fn new(sink: S, capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                next: 0,
                held: BinaryHeap::with_capacity(capacity),
                sink,
                failure: None,
            }),
            space: Condvar::new(),
            capacity,
        }
    }

    /// Block until `index` fits in the buffer.
    ///
    /// Returns false if the batch failed in the meantime. The worker holding
    /// the next expected index never waits, so this cannot deadlock as long
    /// as indices are handed out in ascending order.
    pub(crate) fn wait_for_slot(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        while state.failure.is_none() && index >= state.next + self.capacity {
            self.space.wait(&mut state);
        }
        state.failure.is_none()
    }

    /// Insert a finished result, then emit every result that is now in order.
    pub(crate) fn complete(&self, index: usize, value: T) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.failure.is_some() {
            return;
        }
        state.held.push(Reverse(Pending { index, value }));

        let mut emitted = false;
        while state.held.peek().is_some_and(|head| head.0.index == state.next) {
            let Some(Reverse(head)) = state.held.pop() else {
                break;
            };
            if let Err(err) = state.sink.emit(head.index, head.value) {
                tracing::error!(index = head.index, %err, "sink rejected observation");
                state.failure = Some(err);
                break;
            }
            state.next += 1;
            emitted = true;
        }

        if emitted || state.failure.is_some() {
            self.space.notify_all();
        }
    }

    /// Abort the batch. Only the first failure is kept.
    pub(crate) fn fail(&self, err: HarnessError) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(err);
        }
        state.held.clear();
        self.space.notify_all();
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.state.lock().failure.is_some()
    }

    /// Results emitted so far
    pub(crate) fn emitted(&self) -> usize {
        self.state.lock().next
    }

    /// Number emitted, or the failure that stopped the batch.
    pub(crate) fn finish(self) -> Result<usize, HarnessError> {
        let state = self.state.into_inner();
        match state.failure {
            Some(err) => Err(err),
            None => {
                debug_assert!(state.held.is_empty(), "results left behind a gap");
                Ok(state.next)
            },
        }
    }
}
