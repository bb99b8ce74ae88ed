use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Number of teams provisioned during setup.
pub const DEFAULT_TEAM_COUNT: usize = 20;

/// Number of members created for every team during setup.
pub const DEFAULT_MEMBERS_PER_TEAM: usize = 10;

/// Per-iteration latency ceiling. A response slower than this fails its checks even when the
/// status code is acceptable.
pub const DEFAULT_LATENCY_CEILING: Duration = Duration::from_millis(300);

/// The default p95 response time threshold.
pub const DEFAULT_P95_THRESHOLD: Duration = Duration::from_millis(300);

/// The default error rate threshold (0.1%).
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.001;

/// Transport-level timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default load profile: 30s ramp to 5 virtual users, 5m steady, 30s ramp down.
pub const DEFAULT_STAGES: &str = "30s:5,5m:5,30s:0";

/// Default operation mix, as `(operation, weight)` pairs.
pub const DEFAULT_OPERATION_WEIGHTS: [(crate::Operation, f64); 5] = [
    (crate::Operation::GetTeam, 0.05),
    (crate::Operation::CreatePullRequest, 0.35),
    (crate::Operation::GetReview, 0.25),
    (crate::Operation::MergePullRequest, 0.15),
    (crate::Operation::Reassign, 0.20),
];

/// Process exit status when at least one threshold fails.
pub const THRESHOLD_FAILURE_EXIT_CODE: u8 = 99;
