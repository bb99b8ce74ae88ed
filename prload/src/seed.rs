//! One-time fixture setup run before any load is applied.
use crate::client::TargetApi;
use prload_core::{Member, Population, SeedDataset, SeedSummary, Team};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

const STATUS_CREATED: u16 = 201;

/// Creates `population.teams` teams of `population.members_per_team` members each.
///
/// Teams the service does not answer with `201 Created` are left out of the dataset, but their
/// members are kept for user-scoped calls. Setup itself never fails.
#[instrument(name = "setup", skip_all, fields(teams = population.teams))]
pub async fn setup<A: TargetApi>(api: &A, population: Population) -> (SeedDataset, SeedSummary) {
    info!(
        "Setting up test data: {} teams, {} users...",
        population.teams,
        population.teams * population.members_per_team
    );

    let mut dataset = SeedDataset::new();
    for index in 1..=population.teams {
        let team = generate_team(index, population.members_per_team);

        match api.create_team(&team).await {
            Ok(res) if res.status == STATUS_CREATED => {
                debug!("Created team {}", team.team_name);
                dataset.push_team(&team);
            }
            Ok(res) => {
                warn!(
                    "Dropping team {}: service answered {}",
                    team.team_name, res.status
                );
                dataset.push_members(&team);
            }
            Err(err) => {
                warn!("Dropping team {}: {err}", team.team_name);
                dataset.push_members(&team);
            }
        }
    }

    let summary = SeedSummary {
        attempted_teams: population.teams,
        created_teams: dataset.teams().len(),
        users: dataset.users().len(),
    };

    info!(
        "Setup complete: {} teams, {} users",
        summary.created_teams, summary.users
    );

    (dataset, summary)
}

/// Builds the `index`-th (1-based) team with freshly generated identifiers.
pub fn generate_team(index: usize, members: usize) -> Team {
    Team {
        team_name: format!("team_{}", Uuid::new_v4()),
        members: (1..=members)
            .map(|member| Member {
                user_id: format!("user_{}", Uuid::new_v4()),
                username: format!("User_{index}_{member}"),
                is_active: true,
            })
            .collect(),
    }
}
