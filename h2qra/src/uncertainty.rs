// src/uncertainty.rs
//
// Monte Carlo uncertainty sweep.
//
// Iteration i seeds its own ChaCha8Rng with `base_seed + i` (wrapping),
// resamples both catalogs from the snapshot and re-runs the full pipeline.
// Iterations share nothing mutable, so they are split into contiguous
// blocks over scoped worker threads and stored by index; the summary is
// bit-identical for any thread count. Percentiles are computed only after
// every iteration has finished.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::analysis::{EvaluateOptions, SessionSnapshot};
use crate::error::QraError;
use crate::risk::RiskMetrics;
use crate::stats::PercentileSummary;
use crate::types::{LeakSize, Outcome};

pub const DEFAULT_SAMPLES: usize = 1000;
pub const DEFAULT_SEED: u64 = 3632850;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UncertaintySettings {
    pub samples: usize,
    pub base_seed: u64,
    /// Worker threads; 0 is treated as 1.
    pub threads: usize,
}

impl Default for UncertaintySettings {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            base_seed: DEFAULT_SEED,
            threads: 1,
        }
    }
}

impl UncertaintySettings {
    pub fn seed_for(&self, index: usize) -> u64 {
        self.base_seed.wrapping_add(index as u64)
    }
}

/// Cooperative stop signal, checked before each iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationMetrics {
    pub index: usize,
    pub seed: u64,
    pub metrics: RiskMetrics,
}

/// Percentile twins of one leak size's frequencies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakUncertainty {
    pub leak_size: LeakSize,
    pub total_frequency: PercentileSummary,
    pub shutdown: PercentileSummary,
    pub jetfire: PercentileSummary,
    pub explosion: PercentileSummary,
    pub no_ignition: PercentileSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertaintyResult {
    pub samples: usize,
    pub base_seed: u64,
    pub pll: PercentileSummary,
    pub far: PercentileSummary,
    pub air: PercentileSummary,
    pub leaks: Vec<LeakUncertainty>,
    /// Metrics of every iteration, in index order.
    pub iterations: Vec<IterationMetrics>,
}

/// Per-iteration output: metrics plus [total, shutdown, jetfire,
/// explosion, no_ignition] for each leak size.
struct IterationOutput {
    metrics: RiskMetrics,
    frequencies: Vec<[f64; 5]>,
}

fn run_iteration(
    snapshot: &SessionSnapshot,
    settings: &UncertaintySettings,
    index: usize,
) -> Result<IterationOutput, QraError> {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed_for(index));
    let drawn = snapshot.resample(&mut rng)?;
    let result = drawn.evaluate(EvaluateOptions::default())?;
    let frequencies = result
        .leaks
        .iter()
        .map(|l| {
            let f = &l.event_tree.frequencies;
            [
                l.cut_set.total,
                f.get(Outcome::Shutdown),
                f.get(Outcome::Jetfire),
                f.get(Outcome::Explosion),
                f.get(Outcome::NoIgnition),
            ]
        })
        .collect();
    Ok(IterationOutput {
        metrics: result.metrics(),
        frequencies,
    })
}

type Slot = Option<Result<IterationOutput, QraError>>;

/// Run a sweep of `settings.samples` iterations against `snapshot`.
pub fn run(
    snapshot: &SessionSnapshot,
    settings: &UncertaintySettings,
    cancel: &CancelToken,
) -> Result<UncertaintyResult, UncertaintyError> {
    let n = settings.samples;
    if n == 0 {
        return Err(UncertaintyError::NoSamples);
    }
    let threads = settings.threads.clamp(1, n);
    let chunk = n.div_ceil(threads);

    let mut slots: Vec<Slot> = Vec::with_capacity(n);
    slots.resize_with(n, || None);

    let worker_panicked = thread::scope(|scope| {
        let handles: Vec<_> = slots
            .chunks_mut(chunk)
            .enumerate()
            .map(|(block, out)| {
                let start = block * chunk;
                scope.spawn(move || {
                    for (offset, slot) in out.iter_mut().enumerate() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let outcome = run_iteration(snapshot, settings, start + offset);
                        let failed = outcome.is_err();
                        *slot = Some(outcome);
                        if failed {
                            break;
                        }
                    }
                })
            })
            .collect();
        // Join every handle so a panic is reported here, not by the scope.
        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }
        panicked
    });
    if worker_panicked {
        return Err(UncertaintyError::WorkerPanicked);
    }

    let mut outputs = Vec::with_capacity(n);
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(out)) => outputs.push(out),
            Some(Err(source)) => {
                return Err(UncertaintyError::Iteration {
                    index,
                    seed: settings.seed_for(index),
                    source: Box::new(source),
                })
            }
            None => {
                // Only a cancelled sweep leaves holes.
                let completed = outputs.len();
                return Err(UncertaintyError::Cancelled { completed });
            }
        }
    }

    Ok(summarize(settings, &outputs))
}

fn summarize(settings: &UncertaintySettings, outputs: &[IterationOutput]) -> UncertaintyResult {
    let column = |f: &dyn Fn(&IterationOutput) -> f64| -> PercentileSummary {
        let data: Vec<f64> = outputs.iter().map(f).collect();
        PercentileSummary::from_samples(&data)
    };

    let leaks = LeakSize::ALL
        .iter()
        .enumerate()
        .map(|(li, &leak_size)| {
            let at = |k: usize| column(&|o: &IterationOutput| o.frequencies[li][k]);
            LeakUncertainty {
                leak_size,
                total_frequency: at(0),
                shutdown: at(1),
                jetfire: at(2),
                explosion: at(3),
                no_ignition: at(4),
            }
        })
        .collect();

    let iterations = outputs
        .iter()
        .enumerate()
        .map(|(index, o)| IterationMetrics {
            index,
            seed: settings.seed_for(index),
            metrics: o.metrics,
        })
        .collect();

    UncertaintyResult {
        samples: outputs.len(),
        base_seed: settings.base_seed,
        pll: column(&|o: &IterationOutput| o.metrics.pll),
        far: column(&|o: &IterationOutput| o.metrics.far),
        air: column(&|o: &IterationOutput| o.metrics.air),
        leaks,
        iterations,
    }
}

#[derive(Debug)]
pub enum UncertaintyError {
    NoSamples,
    /// Stopped by the caller; completed samples were discarded.
    Cancelled { completed: usize },
    Iteration {
        index: usize,
        seed: u64,
        source: Box<QraError>,
    },
    WorkerPanicked,
}

impl UncertaintyError {
    pub fn is_defect(&self) -> bool {
        match self {
            UncertaintyError::Iteration { source, .. } => source.is_defect(),
            UncertaintyError::WorkerPanicked => true,
            _ => false,
        }
    }
}

impl fmt::Display for UncertaintyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UncertaintyError::NoSamples => f.write_str("uncertainty sweep needs at least one sample"),
            UncertaintyError::Cancelled { completed } => {
                write!(f, "uncertainty sweep cancelled after {} iterations", completed)
            }
            UncertaintyError::Iteration {
                index,
                seed,
                source,
            } => write!(f, "iteration {} (seed {}) failed: {}", index, seed, source),
            UncertaintyError::WorkerPanicked => f.write_str("uncertainty worker thread panicked"),
        }
    }
}

impl std::error::Error for UncertaintyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UncertaintyError::Iteration { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QraSession;
    use crate::consequence::TabulatedHarm;

    fn snapshot() -> SessionSnapshot {
        let mut s = QraSession::default();
        s.set_harm_model(Arc::new(TabulatedHarm::uniform(2, 0.1)));
        s.snapshot()
    }

    fn settings(samples: usize, threads: usize) -> UncertaintySettings {
        UncertaintySettings {
            samples,
            base_seed: 42,
            threads,
        }
    }

    #[test]
    fn same_seed_same_summary() {
        let snap = snapshot();
        let a = run(&snap, &settings(40, 1), &CancelToken::new()).unwrap();
        let b = run(&snap, &settings(40, 1), &CancelToken::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.samples, 40);
        assert_eq!(a.iterations.len(), 40);
        assert_eq!(a.iterations[3].seed, 45);
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let snap = snapshot();
        let one = run(&snap, &settings(37, 1), &CancelToken::new()).unwrap();
        for threads in [2, 3, 8, 100] {
            let many = run(&snap, &settings(37, threads), &CancelToken::new()).unwrap();
            assert_eq!(one, many, "threads = {threads}");
        }
    }

    #[test]
    fn different_seeds_differ() {
        let snap = snapshot();
        let a = run(&snap, &settings(20, 1), &CancelToken::new()).unwrap();
        let mut other = settings(20, 1);
        other.base_seed = 43;
        let b = run(&snap, &other, &CancelToken::new()).unwrap();
        assert_ne!(a.pll, b.pll);
    }

    #[test]
    fn percentiles_are_ordered() {
        let r = run(&snapshot(), &settings(60, 2), &CancelToken::new()).unwrap();
        for s in [r.pll, r.far, r.air] {
            assert!(s.p05 <= s.p50 && s.p50 <= s.p95, "{s:?}");
        }
        for leak in &r.leaks {
            assert!(leak.total_frequency.p05 <= leak.total_frequency.p95);
        }
        assert_eq!(r.leaks.len(), 5);
    }

    #[test]
    fn cancelled_sweep_reports_no_samples() {
        let cancel = CancelToken::new();
        cancel.cancel();
        match run(&snapshot(), &settings(10, 2), &cancel) {
            Err(UncertaintyError::Cancelled { completed }) => assert_eq!(completed, 0),
            other => panic!("expected Cancelled, got {:?}", other.map(|r| r.samples)),
        }
    }

    #[test]
    fn zero_samples_rejected() {
        assert!(matches!(
            run(&snapshot(), &settings(0, 1), &CancelToken::new()),
            Err(UncertaintyError::NoSamples)
        ));
    }
}
