use std::time::Duration;

/// Distribution summary of a response time series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Aggregate for a single operation tag.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStatistics {
    pub name: &'static str,
    pub iterations: u64,
    pub failures: u64,
    pub transport_failures: u64,
    pub status_failures: u64,
    pub body_failures: u64,
    pub latency_failures: u64,
    pub latency: LatencySummary,
}

impl OperationStatistics {
    pub fn error_rate(&self) -> f64 {
        ratio(self.failures, self.iterations)
    }
}

/// Run-wide aggregate read once at the end of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub iterations: u64,
    pub failures: u64,
    pub error_rate: f64,
    pub latency: LatencySummary,
    pub operations: Vec<OperationStatistics>,
}

/// What setup managed to provision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub attempted_teams: usize,
    pub created_teams: usize,
    /// Users available to iterations, members of rejected teams included.
    pub users: usize,
}

/// `part / whole`, defined as 0 for an empty series.
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.
    } else {
        part as f64 / whole as f64
    }
}
