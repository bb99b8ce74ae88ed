//! Run-wide metrics shared by every virtual user.
//!
//! Counters are atomics and latency samples are staged in an [`AtomicBucket`] before being
//! folded into a digest. Callers never need to synchronize around [`Recorder::record`].
use metrics_util::AtomicBucket;
use pdatastructs::tdigest::{TDigest, K1};
use prload_core::{
    ratio, FailureCause, LatencySummary, Operation, OperationStatistics, Outcome, RunStatistics,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, TryLockError};
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Boolean rate series. `add(true)` counts toward the rate.
#[derive(Debug, Default)]
pub struct Rate {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, hit: bool) {
        // `total` first so a concurrent reader never sees more hits than samples.
        self.total.fetch_add(1, Ordering::AcqRel);
        if hit {
            self.hits.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// `(hits, total)` read so that `hits <= total` even while samples are being added.
    pub fn snapshot(&self) -> (u64, u64) {
        // Reverse of the order in `add`.
        let hits = self.hits();
        (hits, self.total())
    }

    pub fn rate(&self) -> f64 {
        let (hits, total) = self.snapshot();
        ratio(hits, total)
    }
}

/// Numeric distribution series.
///
/// Samples are staged in an [`AtomicBucket`] and folded into a running digest once
/// [`FOLD_BATCH`] have accumulated, so memory stays bounded however long the run. Pushes hold
/// the read side of `gate` and folding takes the write side, so a fold never races a push.
pub struct Trend {
    staged: AtomicBucket<Duration>,
    staged_len: AtomicUsize,
    gate: RwLock<()>,
    folded: Mutex<Folded>,
}

/// Staged samples are folded into the digest once this many have accumulated.
pub const FOLD_BATCH: usize = 4_096;

struct Folded {
    digest: TDigest<K1>,
    count: u64,
    min: Duration,
    max: Duration,
    sum: f64,
}

impl Default for Folded {
    fn default() -> Self {
        Self {
            digest: default_tdigest(),
            count: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            sum: 0.,
        }
    }
}

impl Folded {
    fn insert(&mut self, sample: Duration) {
        self.digest.insert(sample.as_secs_f64());
        self.count += 1;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        self.sum += sample.as_secs_f64();
    }
}

impl Default for Trend {
    fn default() -> Self {
        Self {
            staged: AtomicBucket::new(),
            staged_len: AtomicUsize::new(0),
            gate: RwLock::new(()),
            folded: Mutex::new(Folded::default()),
        }
    }
}

impl Trend {
    pub fn add(&self, sample: Duration) {
        {
            let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
            self.staged.push(sample);
        }

        if self.staged_len.fetch_add(1, Ordering::Relaxed) + 1 >= FOLD_BATCH {
            let gate = match self.gate.try_write() {
                Ok(gate) => Some(gate),
                Err(TryLockError::Poisoned(err)) => Some(err.into_inner()),
                // Someone else is folding or pushing; a later sample retries.
                Err(TryLockError::WouldBlock) => None,
            };
            if let Some(_gate) = gate {
                let mut folded = self.folded.lock().unwrap_or_else(PoisonError::into_inner);
                self.fold(&mut folded);
            }
        }
    }

    /// Samples not yet folded into the digest.
    pub fn staged(&self) -> usize {
        self.staged_len.load(Ordering::Relaxed)
    }

    fn fold(&self, folded: &mut Folded) {
        self.staged.clear_with(|block| {
            for sample in block {
                folded.insert(*sample);
            }
        });
        self.staged_len.store(0, Ordering::Relaxed);
    }

    pub fn summary(&self) -> LatencySummary {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let mut folded = self.folded.lock().unwrap_or_else(PoisonError::into_inner);
        self.fold(&mut folded);

        if folded.count == 0 {
            return LatencySummary::default();
        }

        LatencySummary {
            count: folded.count,
            min: folded.min,
            mean: Duration::from_secs_f64(folded.sum / folded.count as f64),
            max: folded.max,
            p50: quantile(&folded.digest, 0.50),
            p90: quantile(&folded.digest, 0.90),
            p95: quantile(&folded.digest, 0.95),
            p99: quantile(&folded.digest, 0.99),
        }
    }
}

#[derive(Default)]
struct OperationSeries {
    errors: Rate,
    response_time: Trend,
    causes: [AtomicU64; FailureCause::COUNT],
}

impl OperationSeries {
    fn cause(&self, cause: FailureCause) -> u64 {
        self.causes[cause.index()].load(Ordering::Relaxed)
    }

    fn statistics(&self, operation: Operation) -> OperationStatistics {
        let (failures, iterations) = self.errors.snapshot();
        OperationStatistics {
            name: operation.name(),
            iterations,
            failures,
            transport_failures: self.cause(FailureCause::Transport),
            status_failures: self.cause(FailureCause::Status),
            body_failures: self.cause(FailureCause::Body),
            latency_failures: self.cause(FailureCause::Latency),
            latency: self.response_time.summary(),
        }
    }
}

/// Aggregates iteration outcomes into an error rate and a response time distribution, overall
/// and per operation.
pub struct Recorder {
    errors: Rate,
    response_time: Trend,
    operations: [OperationSeries; Operation::COUNT],
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        {
            metrics::describe_counter!("prload.iterations", "Iterations recorded");
            metrics::describe_counter!("prload.errors", "Iterations that failed a check");
            metrics::describe_histogram!(
                "prload.response_time",
                metrics::Unit::Seconds,
                "Iteration response time"
            );
        }

        Self {
            errors: Rate::default(),
            response_time: Trend::default(),
            operations: std::array::from_fn(|_| OperationSeries::default()),
        }
    }

    pub fn record(&self, outcome: &Outcome) {
        let failed = !outcome.success();
        let series = &self.operations[outcome.operation.index()];

        self.errors.add(failed);
        self.response_time.add(outcome.elapsed);
        series.errors.add(failed);
        series.response_time.add(outcome.elapsed);
        for cause in &outcome.failures {
            series.causes[cause.index()].fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        {
            let operation = outcome.operation.name();
            metrics::counter!("prload.iterations", "operation" => operation).increment(1);
            if failed {
                metrics::counter!("prload.errors", "operation" => operation).increment(1);
            }
            metrics::histogram!("prload.response_time", "operation" => operation)
                .record(outcome.elapsed.as_secs_f64());
        }
    }

    /// The overall error series.
    pub fn errors(&self) -> &Rate {
        &self.errors
    }

    /// The overall response time series.
    pub fn response_time(&self) -> &Trend {
        &self.response_time
    }

    pub fn error_rate(&self) -> f64 {
        self.errors.rate()
    }

    pub fn statistics(&self) -> RunStatistics {
        let (failures, iterations) = self.errors.snapshot();
        RunStatistics {
            iterations,
            failures,
            error_rate: ratio(failures, iterations),
            latency: self.response_time.summary(),
            operations: Operation::ALL
                .iter()
                .map(|op| self.operations[op.index()].statistics(*op))
                .collect(),
        }
    }
}

fn quantile(digest: &TDigest<K1>, q: f64) -> Duration {
    let secs = digest.quantile(q);

    // TDigest can return NaN on degenerate inputs.
    let secs = if secs.is_finite() {
        secs.max(0.)
    } else {
        error!("NaN latency quantile; reporting 0.");
        0.
    };

    Duration::from_secs_f64(secs)
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
