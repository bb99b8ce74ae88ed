//! In-process stand-in for the target service used by unit tests.
use crate::client::{ApiResponse, ClientError, TargetApi};
use prload_core::{Member, Operation, SeedDataset, Team};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct FakeApi {
    status: Option<u16>,
    delay: Duration,
    reachable: bool,
    reject_every_nth_team: Option<u64>,
    echo_team: Option<String>,
    team_creations: Arc<AtomicU64>,
    calls: Arc<[AtomicU64; Operation::COUNT]>,
}

impl FakeApi {
    /// Answers every call with its nominal success status and a well-formed body.
    pub fn healthy() -> Self {
        Self {
            status: None,
            delay: Duration::ZERO,
            reachable: true,
            reject_every_nth_team: None,
            echo_team: None,
            team_creations: Arc::new(AtomicU64::new(0)),
            calls: Arc::new(Default::default()),
        }
    }

    /// Every call fails at the transport level.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::healthy()
        }
    }

    /// Answers every call, team creation included, with `status`.
    pub fn always(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reject_every_nth_team(mut self, n: u64) -> Self {
        self.reject_every_nth_team = Some(n);
        self
    }

    /// `GET /team/get` echoes `team` instead of the requested one.
    pub fn echo_team(mut self, team: &str) -> Self {
        self.echo_team = Some(team.to_string());
        self
    }

    pub fn team_creations(&self) -> u64 {
        self.team_creations.load(Ordering::Relaxed)
    }

    pub fn calls(&self, operation: Operation) -> u64 {
        self.calls[operation.index()].load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u64 {
        Operation::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    async fn respond(
        &self,
        operation: Option<Operation>,
        status: u16,
        body: String,
    ) -> Result<ApiResponse, ClientError> {
        if let Some(operation) = operation {
            self.calls[operation.index()].fetch_add(1, Ordering::Relaxed);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if !self.reachable {
            return Err(ClientError::Timeout(self.delay));
        }

        Ok(ApiResponse {
            status: self.status.unwrap_or(status),
            body,
            elapsed: self.delay,
        })
    }
}

impl TargetApi for FakeApi {
    async fn create_team(&self, _team: &Team) -> Result<ApiResponse, ClientError> {
        let n = self.team_creations.fetch_add(1, Ordering::Relaxed) + 1;
        let status = match self.reject_every_nth_team {
            Some(every) if n % every == 0 => 500,
            _ => 201,
        };
        self.respond(None, status, String::new()).await
    }

    async fn get_team(&self, team_name: &str) -> Result<ApiResponse, ClientError> {
        let echoed = self.echo_team.as_deref().unwrap_or(team_name);
        let body = serde_json::json!({
            "team": { "team_name": echoed, "members": [] }
        });
        self.respond(Some(Operation::GetTeam), 200, body.to_string())
            .await
    }

    async fn create_pull_request(
        &self,
        _pull_request_id: &str,
        _pull_request_name: &str,
        _author_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.respond(Some(Operation::CreatePullRequest), 201, String::new())
            .await
    }

    async fn get_review(&self, user_id: &str) -> Result<ApiResponse, ClientError> {
        let body = serde_json::json!({ "user_id": user_id, "pull_requests": [] });
        self.respond(Some(Operation::GetReview), 200, body.to_string())
            .await
    }

    async fn merge_pull_request(
        &self,
        _pull_request_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.respond(Some(Operation::MergePullRequest), 404, String::new())
            .await
    }

    async fn reassign_reviewer(
        &self,
        _pull_request_id: &str,
        _old_user_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        self.respond(Some(Operation::Reassign), 404, String::new())
            .await
    }
}

fn team(t: usize, members: usize) -> Team {
    Team {
        team_name: format!("team_{t}"),
        members: (0..members)
            .map(|m| Member {
                user_id: format!("user_{t}_{m}"),
                username: format!("User_{t}_{m}"),
                is_active: true,
            })
            .collect(),
    }
}

/// Dataset of `teams` teams named `team_<n>` with `members` users each.
pub(crate) fn dataset(teams: usize, members: usize) -> SeedDataset {
    let mut dataset = SeedDataset::new();
    for t in 0..teams {
        dataset.push_team(&team(t, members));
    }
    dataset
}

/// Like [`dataset`], but as if every team creation had been rejected.
pub(crate) fn users_only(teams: usize, members: usize) -> SeedDataset {
    let mut dataset = SeedDataset::new();
    for t in 0..teams {
        dataset.push_members(&team(t, members));
    }
    dataset
}
