// ============================================================================
// Replication Harness
// Runs independent replications on a worker pool, emits in index order
// ============================================================================
//
// Replications share no mutable state; the only shared resource is the
// sink. Workers pull indices in ascending order from a channel, run them to
// completion and hand the result to a bounded reorder buffer, which emits
// to the sink strictly in index order.
//
// A replication error or panic is fatal to the batch: once a failure is
// recorded nothing further is emitted, so the sink only ever holds a prefix
// of the batch in order.
// ============================================================================

mod reorder;

pub use crate::error::HarnessError;

use crate::domain::{HarnessConfig, SimulationConfig};
use crate::error::SimResult;
use crate::interfaces::{NoOpObserver, PriceOracle};
use crate::simulation::{run_replication, Observation, Simulation};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reorder::ReorderBuffer;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Seed for replication `index` derived from the batch seed.
///
/// Independent of worker count and completion order.
pub fn replication_seed(base_seed: u64, index: usize) -> u64 {
    let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
    rng.set_stream(index as u64);
    rng.next_u64()
}

// ============================================================================
// Sinks
// ============================================================================

/// Receives replication outputs, one call per index, in index order.
pub trait ObservationSink<T> {
    fn emit(&mut self, index: usize, value: T) -> Result<(), HarnessError>;
}

impl<T, S: ObservationSink<T> + ?Sized> ObservationSink<T> for &mut S {
    fn emit(&mut self, index: usize, value: T) -> Result<(), HarnessError> {
        (**self).emit(index, value)
    }
}

/// Collects outputs in memory.
#[derive(Debug, Clone)]
pub struct VecSink<T> {
    items: Vec<T>,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObservationSink<T> for VecSink<T> {
    fn emit(&mut self, _index: usize, value: T) -> Result<(), HarnessError> {
        self.items.push(value);
        Ok(())
    }
}

/// Forwards every output to a closure.
pub struct FnSink<F>(pub F);

impl<T, F> ObservationSink<T> for FnSink<F>
where
    F: FnMut(usize, T) -> Result<(), HarnessError>,
{
    fn emit(&mut self, index: usize, value: T) -> Result<(), HarnessError> {
        (self.0)(index, value)
    }
}

/// Writes one JSON object per line: `{"replication": i, "observation": ...}`.
#[cfg(feature = "serde")]
pub struct JsonLinesSink<W: std::io::Write> {
    writer: W,
}

#[cfg(feature = "serde")]
impl<W: std::io::Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(feature = "serde")]
impl<T: serde::Serialize, W: std::io::Write> ObservationSink<T> for JsonLinesSink<W> {
    fn emit(&mut self, index: usize, value: T) -> Result<(), HarnessError> {
        #[derive(serde::Serialize)]
        struct Line<'a, T> {
            replication: usize,
            observation: &'a T,
        }

        serde_json::to_writer(
            &mut self.writer,
            &Line {
                replication: index,
                observation: &value,
            },
        )
        .map_err(|e| HarnessError::SinkFailed(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| HarnessError::SinkFailed(e.to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fixed-size worker pool for one batch of replications.
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate().map_err(HarnessError::InvalidConfig)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run `replicate(index, seed)` for every index and stream the outputs
    /// to `sink` in index order. Returns how many were emitted.
    pub fn run<T, F, S>(&self, replicate: F, sink: S) -> Result<usize, HarnessError>
    where
        T: Send,
        F: Fn(usize, u64) -> SimResult<T> + Sync,
        S: ObservationSink<T> + Send,
    {
        let HarnessConfig {
            replications,
            workers,
            base_seed,
            buffer_capacity,
            pin_workers,
        } = self.config;

        tracing::info!(replications, workers, base_seed, "starting batch");

        if pin_workers {
            let cores = crate::utils::available_cores().len();
            if workers > cores {
                tracing::warn!(workers, cores, "more workers than cores, pinned workers will share");
            }
        }

        let buffer = ReorderBuffer::new(sink, buffer_capacity);
        let (tx, rx) = crossbeam::channel::unbounded();
        for index in 0..replications {
            // Receiver is alive, send cannot fail.
            let _ = tx.send(index);
        }
        drop(tx);

        let scoped = crossbeam::thread::scope(|scope| {
            for worker in 0..workers.min(replications) {
                let rx = rx.clone();
                let buffer = &buffer;
                let replicate = &replicate;
                scope.spawn(move |_| {
                    if pin_workers && !crate::utils::pin_worker(worker) {
                        tracing::warn!(worker, "could not pin worker to a core");
                    }
                    for index in rx.iter() {
                        if !buffer.wait_for_slot(index) {
                            break;
                        }
                        let seed = replication_seed(base_seed, index);
                        tracing::info!(index, worker, "replication started");

                        match catch_unwind(AssertUnwindSafe(|| replicate(index, seed))) {
                            Ok(Ok(value)) => {
                                tracing::info!(index, worker, "replication finished");
                                let emitted =
                                    catch_unwind(AssertUnwindSafe(|| buffer.complete(index, value)));
                                if emitted.is_err() {
                                    tracing::error!(index, "sink panicked");
                                    let at = buffer.emitted();
                                    buffer.fail(HarnessError::WorkerPanicked { index: at });
                                    break;
                                }
                            },
                            Ok(Err(source)) => {
                                tracing::error!(index, %source, "replication failed");
                                buffer.fail(HarnessError::ReplicationFailed { index, source });
                                break;
                            },
                            Err(_) => {
                                tracing::error!(index, "replication panicked");
                                buffer.fail(HarnessError::WorkerPanicked { index });
                                break;
                            },
                        }
                        if buffer.is_failed() {
                            break;
                        }
                    }
                });
            }
        });

        if scoped.is_err() {
            let index = buffer.emitted();
            buffer.fail(HarnessError::WorkerPanicked { index });
        }

        let result = buffer.finish();
        match &result {
            Ok(emitted) => tracing::info!(emitted, "batch finished"),
            Err(err) => tracing::warn!(%err, "batch aborted"),
        }
        result
    }

    /// Run the batch and return every output in index order, or nothing.
    pub fn run_collect<T, F>(&self, replicate: F) -> Result<Vec<T>, HarnessError>
    where
        T: Send,
        F: Fn(usize, u64) -> SimResult<T> + Sync,
    {
        let mut sink = VecSink::new();
        self.run(replicate, &mut sink)?;
        Ok(sink.into_inner())
    }

    /// Run full market simulations and stream their observations.
    ///
    /// `setup` populates each fresh simulation (participants, external
    /// order flow) before it runs to the configured end time.
    pub fn run_simulations<F, S>(
        &self,
        config: &SimulationConfig,
        oracle: &dyn PriceOracle,
        setup: F,
        sink: S,
    ) -> Result<usize, HarnessError>
    where
        F: Fn(&mut Simulation, usize) -> SimResult<()> + Sync,
        S: ObservationSink<Observation> + Send,
    {
        config
            .validate()
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        self.run(
            |index, seed| {
                run_replication(config, seed, Arc::new(NoOpObserver), oracle, |sim| {
                    setup(sim, index)
                })
            },
            sink,
        )
    }
}
