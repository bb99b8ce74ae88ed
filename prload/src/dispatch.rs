//! One iteration: draw an operation, pick operands, call the service, check the response and
//! hand the outcome to the recorder.
use crate::client::{ApiResponse, ClientError, TargetApi};
use crate::recorder::Recorder;
use prload_core::{ConfigError, FailureCause, Operation, Outcome, SeedDataset};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Cumulative-weight selection over a fixed set of choices.
///
/// Holds sorted `(upper_bound, choice)` pairs. A draw in `[0, 1)` selects the first choice whose
/// upper bound exceeds it.
#[derive(Debug, Clone)]
pub struct WeightedChoice<T> {
    bounds: Vec<(f64, T)>,
}

impl<T> WeightedChoice<T> {
    /// Weights must be positive and sum to 1.
    pub fn new(weights: impl IntoIterator<Item = (T, f64)>) -> Result<Self, ConfigError> {
        let mut bounds = vec![];
        let mut cumulative = 0.;
        for (choice, weight) in weights {
            if !(weight > 0.) || !weight.is_finite() {
                return Err(ConfigError::InvalidWeights(weight));
            }
            cumulative += weight;
            bounds.push((cumulative, choice));
        }

        if bounds.is_empty() || (cumulative - 1.).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(cumulative));
        }

        // Absorb rounding so that every draw below 1 lands somewhere.
        if let Some(last) = bounds.last_mut() {
            last.0 = 1.;
        }

        Ok(Self { bounds })
    }

    pub fn select(&self, draw: f64) -> &T {
        let idx = self.bounds.partition_point(|(upper, _)| *upper <= draw);
        &self.bounds[idx.min(self.bounds.len() - 1)].1
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

/// A fully resolved call, operands included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetTeam {
        team_name: String,
    },
    CreatePullRequest {
        pull_request_id: String,
        author_id: String,
    },
    GetReview {
        user_id: String,
    },
    MergePullRequest {
        pull_request_id: String,
    },
    Reassign {
        pull_request_id: String,
        old_user_id: String,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::GetTeam { .. } => Operation::GetTeam,
            Request::CreatePullRequest { .. } => Operation::CreatePullRequest,
            Request::GetReview { .. } => Operation::GetReview,
            Request::MergePullRequest { .. } => Operation::MergePullRequest,
            Request::Reassign { .. } => Operation::Reassign,
        }
    }

    /// Picks operands for `operation` from `dataset`.
    ///
    /// Returns `None` when the operation needs a team or user and the dataset has none.
    pub fn prepare<R: Rng>(
        operation: Operation,
        dataset: &SeedDataset,
        rng: &mut R,
    ) -> Option<Request> {
        let request = match operation {
            Operation::GetTeam => Request::GetTeam {
                team_name: pick(dataset.teams(), rng)?.clone(),
            },
            Operation::CreatePullRequest => Request::CreatePullRequest {
                pull_request_id: pull_request_id(),
                author_id: pick(dataset.users(), rng)?.user_id.clone(),
            },
            Operation::GetReview => Request::GetReview {
                user_id: pick(dataset.users(), rng)?.user_id.clone(),
            },
            Operation::MergePullRequest => Request::MergePullRequest {
                pull_request_id: pull_request_id(),
            },
            Operation::Reassign => Request::Reassign {
                pull_request_id: pull_request_id(),
                old_user_id: pick(dataset.users(), rng)?.user_id.clone(),
            },
        };

        Some(request)
    }

    async fn send<A: TargetApi>(&self, api: &A) -> Result<ApiResponse, ClientError> {
        match self {
            Request::GetTeam { team_name } => api.get_team(team_name).await,
            Request::CreatePullRequest {
                pull_request_id,
                author_id,
            } => {
                let name = format!("Feature {pull_request_id}");
                api.create_pull_request(pull_request_id, &name, author_id)
                    .await
            }
            Request::GetReview { user_id } => api.get_review(user_id).await,
            Request::MergePullRequest { pull_request_id } => {
                api.merge_pull_request(pull_request_id).await
            }
            Request::Reassign {
                pull_request_id,
                old_user_id,
            } => api.reassign_reviewer(pull_request_id, old_user_id).await,
        }
    }
}

fn pick<'a, T, R: Rng>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        Some(&items[rng.gen_range(0..items.len())])
    }
}

fn pull_request_id() -> String {
    format!("pr_{}", Uuid::new_v4())
}

/// Statuses that count as success for each operation.
///
/// Pull requests are not tracked across iterations, so "not found" and "conflict" on a freshly
/// generated identifier are expected answers rather than defects of the service.
pub fn accepted_statuses(operation: Operation) -> &'static [u16] {
    match operation {
        Operation::GetTeam => &[200],
        Operation::CreatePullRequest => &[201, 409],
        Operation::GetReview => &[200],
        Operation::MergePullRequest => &[200, 404],
        Operation::Reassign => &[200, 404, 409],
    }
}

/// Runs every check that applies to `request` and returns the failed ones.
pub fn validate(
    request: &Request,
    response: &ApiResponse,
    latency_ceiling: Duration,
) -> Vec<FailureCause> {
    let mut failures = vec![];

    if !accepted_statuses(request.operation()).contains(&response.status) {
        failures.push(FailureCause::Status);
    }

    let body_ok = match request {
        Request::GetTeam { team_name } => team_body_matches(&response.body, team_name),
        Request::GetReview { .. } => review_body_is_valid(&response.body),
        _ => true,
    };
    if !body_ok {
        failures.push(FailureCause::Body);
    }

    if response.elapsed >= latency_ceiling {
        failures.push(FailureCause::Latency);
    }

    failures
}

/// `{"team": {"team_name": <requested>, "members": [...]}}`
fn team_body_matches(body: &str, requested: &str) -> bool {
    let Ok(body) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let team = &body["team"];
    team["team_name"].as_str() == Some(requested) && team["members"].is_array()
}

/// `{"user_id": ..., "pull_requests": ...}`
fn review_body_is_valid(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map.contains_key("user_id") && map.contains_key("pull_requests"),
        _ => false,
    }
}

/// Executes iterations against a shared, read-only seed dataset.
pub struct Dispatcher<A> {
    api: A,
    dataset: Arc<SeedDataset>,
    recorder: Arc<Recorder>,
    mix: WeightedChoice<Operation>,
    latency_ceiling: Duration,
}

impl<A: TargetApi + Sync> Dispatcher<A> {
    pub fn new(
        api: A,
        dataset: Arc<SeedDataset>,
        recorder: Arc<Recorder>,
        mix: WeightedChoice<Operation>,
        latency_ceiling: Duration,
    ) -> Self {
        Self {
            api,
            dataset,
            recorder,
            mix,
            latency_ceiling,
        }
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Runs one iteration. Returns `None` when the drawn operation was skipped for lack of
    /// operands; nothing is recorded in that case.
    pub async fn iterate<R: Rng>(&self, rng: &mut R) -> Option<Outcome> {
        let operation = *self.mix.select(rng.gen());

        let Some(request) = Request::prepare(operation, &self.dataset, rng) else {
            trace!("Skipping {operation}: no operands in seed dataset");
            return None;
        };

        let outcome = self.execute(&request).await;
        self.recorder.record(&outcome);
        Some(outcome)
    }

    /// Issues `request` and checks the response. Does not record.
    pub async fn execute(&self, request: &Request) -> Outcome {
        let operation = request.operation();
        let start = Instant::now();

        match request.send(&self.api).await {
            Ok(response) => {
                let failures = validate(request, &response, self.latency_ceiling);
                if !failures.is_empty() {
                    debug!(
                        "{operation} failed {failures:?} (status {}, {:?})",
                        response.status, response.elapsed
                    );
                }
                Outcome {
                    operation,
                    elapsed: response.elapsed,
                    failures,
                }
            }
            Err(err) => {
                warn!("{operation} transport failure: {err}");
                Outcome {
                    operation,
                    elapsed: start.elapsed(),
                    failures: vec![FailureCause::Transport],
                }
            }
        }
    }
}
