//! Pass/fail criteria evaluated once against the final statistics.
use prload_core::{RunStatistics, Thresholds};
use std::fmt;
use std::time::Duration;

pub trait Threshold: Send {
    fn evaluate(&self, statistics: &RunStatistics) -> ThresholdResult;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    /// Human readable criterion, e.g. `p(95)<300ms`.
    pub criterion: String,
    pub observed: String,
    pub passed: bool,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{verdict}] {} (observed {})",
            self.criterion, self.observed
        )
    }
}

/// The 95th percentile response time must be strictly below the limit.
pub struct P95Latency {
    limit: Duration,
}

impl P95Latency {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Threshold for P95Latency {
    fn evaluate(&self, statistics: &RunStatistics) -> ThresholdResult {
        let observed = statistics.latency.p95;
        ThresholdResult {
            criterion: format!(
                "response_time p(95)<{}",
                humantime::format_duration(self.limit)
            ),
            observed: format!("{observed:.2?}"),
            passed: observed < self.limit,
        }
    }
}

/// The overall error rate must be strictly below the limit.
pub struct ErrorRate {
    limit: f64,
}

impl ErrorRate {
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }
}

impl Threshold for ErrorRate {
    fn evaluate(&self, statistics: &RunStatistics) -> ThresholdResult {
        let observed = statistics.error_rate;
        ThresholdResult {
            criterion: format!("errors rate<{}", self.limit),
            observed: format!("{:.4} ({}/{})", observed, statistics.failures, statistics.iterations),
            passed: observed < self.limit,
        }
    }
}

/// Every configured threshold, evaluated in declaration order.
pub struct ThresholdSet {
    thresholds: Vec<Box<dyn Threshold>>,
}

impl ThresholdSet {
    pub fn new(config: &Thresholds) -> Self {
        Self {
            thresholds: vec![
                Box::new(P95Latency::new(config.p95_latency)) as Box<dyn Threshold>,
                Box::new(ErrorRate::new(config.max_error_rate)),
            ],
        }
    }

    pub fn evaluate(&self, statistics: &RunStatistics) -> Vec<ThresholdResult> {
        self.thresholds
            .iter()
            .map(|t| t.evaluate(statistics))
            .collect()
    }
}
