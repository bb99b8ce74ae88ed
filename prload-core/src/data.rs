use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the five API calls an iteration can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetTeam,
    CreatePullRequest,
    GetReview,
    MergePullRequest,
    Reassign,
}

impl Operation {
    pub const COUNT: usize = 5;

    pub const ALL: [Operation; Operation::COUNT] = [
        Operation::GetTeam,
        Operation::CreatePullRequest,
        Operation::GetReview,
        Operation::MergePullRequest,
        Operation::Reassign,
    ];

    /// Tag used for metric labels and the console summary.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetTeam => "get_team",
            Operation::CreatePullRequest => "create_pr",
            Operation::GetReview => "get_review",
            Operation::MergePullRequest => "merge_pr",
            Operation::Reassign => "reassign",
        }
    }

    /// Stable index into per-operation arrays.
    pub fn index(&self) -> usize {
        match self {
            Operation::GetTeam => 0,
            Operation::CreatePullRequest => 1,
            Operation::GetReview => 2,
            Operation::MergePullRequest => 3,
            Operation::Reassign => 4,
        }
    }

    /// Whether the operation needs a team from the seed dataset.
    pub fn needs_team(&self) -> bool {
        matches!(self, Operation::GetTeam)
    }

    /// Whether the operation needs a user from the seed dataset.
    pub fn needs_user(&self) -> bool {
        matches!(
            self,
            Operation::CreatePullRequest | Operation::GetReview | Operation::Reassign
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Team member as sent in the `POST /team/add` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// Team as sent in the `POST /team/add` body and echoed by `GET /team/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub team_name: String,
    pub members: Vec<Member>,
}

/// A seeded user and the team it belongs to. The team is referenced by name only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededUser {
    pub user_id: String,
    pub team_name: String,
}

/// Fixture produced once by setup and shared read-only with every iteration.
#[derive(Debug, Clone, Default)]
pub struct SeedDataset {
    teams: Vec<String>,
    users: Vec<SeededUser>,
}

impl SeedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a successfully created team together with its members.
    pub fn push_team(&mut self, team: &Team) {
        self.teams.push(team.team_name.clone());
        self.push_members(team);
    }

    /// Adds the members of `team` without the team itself.
    ///
    /// Used when team creation failed: user-scoped calls still target these users, so a
    /// service that rejects everything shows up as recorded failures.
    pub fn push_members(&mut self, team: &Team) {
        self.users
            .extend(team.members.iter().map(|member| SeededUser {
                user_id: member.user_id.clone(),
                team_name: team.team_name.clone(),
            }));
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn users(&self) -> &[SeededUser] {
        &self.users
    }

    /// No teams and no users.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.users.is_empty()
    }
}

/// Which check caused an iteration to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The request never produced a response.
    Transport,
    /// The status code is outside the accepted set.
    Status,
    /// The body could not be parsed or lacks required fields.
    Body,
    /// The response took at least the latency ceiling.
    Latency,
}

impl FailureCause {
    pub const COUNT: usize = 4;

    pub fn index(&self) -> usize {
        match self {
            FailureCause::Transport => 0,
            FailureCause::Status => 1,
            FailureCause::Body => 2,
            FailureCause::Latency => 3,
        }
    }
}

/// Result of one iteration, consumed immediately by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub operation: Operation,
    pub elapsed: Duration,
    pub failures: Vec<FailureCause>,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str, members: usize) -> Team {
        Team {
            team_name: name.to_string(),
            members: (0..members)
                .map(|i| Member {
                    user_id: format!("{name}_user_{i}"),
                    username: format!("User_{i}"),
                    is_active: true,
                })
                .collect(),
        }
    }

    #[test]
    fn dataset_flattens_members() {
        let mut dataset = SeedDataset::new();
        dataset.push_team(&team("a", 2));
        dataset.push_team(&team("b", 3));

        assert_eq!(dataset.teams(), &["a".to_string(), "b".to_string()]);
        assert_eq!(dataset.users().len(), 5);
        assert_eq!(dataset.users()[3].team_name, "b");
        assert_eq!(dataset.users()[3].user_id, "b_user_1");
    }

    #[test]
    fn members_kept_without_their_team() {
        let mut dataset = SeedDataset::new();
        dataset.push_team(&team("a", 2));
        dataset.push_members(&team("b", 3));

        assert_eq!(dataset.teams(), &["a".to_string()]);
        assert_eq!(dataset.users().len(), 5);
        assert_eq!(dataset.users()[4].team_name, "b");
        assert!(!dataset.is_empty());

        let mut orphans = SeedDataset::new();
        orphans.push_members(&team("c", 1));
        assert!(orphans.teams().is_empty());
        assert!(!orphans.is_empty());
        assert!(SeedDataset::new().is_empty());
    }

    #[test]
    fn operation_indices_are_dense() {
        for (idx, op) in Operation::ALL.iter().enumerate() {
            assert_eq!(op.index(), idx);
        }
    }

    #[test]
    fn team_body_shape() {
        let body = serde_json::to_value(team("t", 1)).unwrap();
        assert_eq!(body["team_name"], "t");
        assert_eq!(body["members"][0]["user_id"], "t_user_0");
        assert_eq!(body["members"][0]["is_active"], true);
    }
}
