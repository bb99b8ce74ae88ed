use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use prload_core::Team;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const MAX_REVIEWERS: usize = 2;

/// Behaviour knobs for tests.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Added to every request before it is handled.
    pub delay: Duration,
    /// Answer every route, team creation included, with this status and an empty body.
    pub forced_status: Option<u16>,
    /// Fail every Nth team creation (1-based) with a 500.
    pub reject_every_nth_team: Option<u64>,
}

impl MockConfig {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn forced_status(mut self, status: u16) -> Self {
        self.forced_status = Some(status);
        self
    }

    pub fn reject_every_nth_team(mut self, n: u64) -> Self {
        self.reject_every_nth_team = Some(n);
        self
    }
}

/// Binds `addr` and serves the default configuration until the process exits.
pub async fn run(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    serve(listener, MockConfig::default()).await
}

/// Serves on an ephemeral localhost port in the background and returns the bound address.
pub async fn spawn(config: MockConfig) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    debug!("Mock service bound to {addr} with {config:?}");
    tokio::spawn(serve(listener, config));
    Ok(addr)
}

pub async fn serve(listener: TcpListener, config: MockConfig) -> std::io::Result<()> {
    axum::serve(listener, router(config)).await
}

pub fn router(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(RwLock::new(Store::default())),
        team_creations: Arc::new(AtomicU64::new(0)),
    };

    Router::new()
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/users/getReview", get(get_review))
        .route_layer(middleware::from_fn_with_state(state.clone(), knobs))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    store: Arc<RwLock<Store>>,
    team_creations: Arc<AtomicU64>,
}

struct User {
    team_name: String,
    is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum PullRequestStatus {
    Open,
    Merged,
}

#[derive(Debug, Clone, Serialize)]
struct PullRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: PullRequestStatus,
    assigned_reviewers: Vec<String>,
}

#[derive(Default)]
struct Store {
    teams: HashMap<String, Team>,
    users: HashMap<String, User>,
    pull_requests: HashMap<String, PullRequest>,
}

impl Store {
    /// Active members of `team_name` that are not in `exclude`.
    fn candidates(&self, team_name: &str, exclude: &[&str]) -> Vec<String> {
        self.teams
            .get(team_name)
            .map(|team| {
                team.members
                    .iter()
                    .filter(|m| !exclude.contains(&m.user_id.as_str()))
                    .filter(|m| self.users.get(&m.user_id).is_some_and(|u| u.is_active))
                    .map(|m| m.user_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn pick(candidates: &[String], n: usize) -> Vec<String> {
    candidates
        .choose_multiple(&mut rand::thread_rng(), n)
        .cloned()
        .collect()
}

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

async fn knobs(State(state): State<AppState>, request: Request, next: Next) -> Response {
    counter!("mock_service.requests").increment(1);

    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }

    if let Some(status) = state.config.forced_status {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    next.run(request).await
}

async fn add_team(State(state): State<AppState>, Json(team): Json<Team>) -> ApiResult {
    let n = state.team_creations.fetch_add(1, Ordering::Relaxed) + 1;
    if state
        .config
        .reject_every_nth_team
        .is_some_and(|every| every > 0 && n % every == 0)
    {
        debug!("Rejecting team creation #{n}");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        ));
    }

    let mut store = state.store.write().await;
    if store.teams.contains_key(&team.team_name) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "TEAM_EXISTS",
            "team already exists",
        ));
    }

    for member in &team.members {
        store.users.insert(
            member.user_id.clone(),
            User {
                team_name: team.team_name.clone(),
                is_active: member.is_active,
            },
        );
    }
    store.teams.insert(team.team_name.clone(), team.clone());

    Ok((StatusCode::CREATED, Json(json!({ "team": team }))))
}

#[derive(Deserialize)]
struct TeamQuery {
    team_name: String,
}

async fn get_team(State(state): State<AppState>, Query(query): Query<TeamQuery>) -> ApiResult {
    let store = state.store.read().await;
    let team = store
        .teams
        .get(&query.team_name)
        .ok_or_else(|| ApiError::not_found("team not found"))?;

    Ok((StatusCode::OK, Json(json!({ "team": team }))))
}

#[derive(Deserialize)]
struct CreatePullRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
}

async fn create_pull_request(
    State(state): State<AppState>,
    Json(req): Json<CreatePullRequest>,
) -> ApiResult {
    let mut store = state.store.write().await;
    if store.pull_requests.contains_key(&req.pull_request_id) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "PR_EXISTS",
            "pull request already exists",
        ));
    }

    let author = store
        .users
        .get(&req.author_id)
        .ok_or_else(|| ApiError::not_found("pull request author not found"))?;
    let candidates = store.candidates(&author.team_name, &[&req.author_id]);

    let pr = PullRequest {
        pull_request_id: req.pull_request_id,
        pull_request_name: req.pull_request_name,
        author_id: req.author_id,
        status: PullRequestStatus::Open,
        assigned_reviewers: pick(&candidates, MAX_REVIEWERS),
    };
    store
        .pull_requests
        .insert(pr.pull_request_id.clone(), pr.clone());

    Ok((StatusCode::CREATED, Json(json!({ "pr": pr }))))
}

#[derive(Deserialize)]
struct MergePullRequest {
    pull_request_id: String,
}

async fn merge_pull_request(
    State(state): State<AppState>,
    Json(req): Json<MergePullRequest>,
) -> ApiResult {
    let mut store = state.store.write().await;
    let pr = store
        .pull_requests
        .get_mut(&req.pull_request_id)
        .ok_or_else(|| ApiError::not_found("pull request not found"))?;

    // Merging twice is a no-op.
    pr.status = PullRequestStatus::Merged;

    Ok((StatusCode::OK, Json(json!({ "pr": pr }))))
}

#[derive(Deserialize)]
struct Reassign {
    pull_request_id: String,
    old_user_id: String,
}

async fn reassign_reviewer(State(state): State<AppState>, Json(req): Json<Reassign>) -> ApiResult {
    let mut store = state.store.write().await;
    let pr = store
        .pull_requests
        .get(&req.pull_request_id)
        .ok_or_else(|| ApiError::not_found("pull request not found"))?;

    if pr.status == PullRequestStatus::Merged {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "PR_MERGED",
            "cannot reassign on merged PR",
        ));
    }

    if !pr.assigned_reviewers.contains(&req.old_user_id) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "NOT_ASSIGNED",
            "reviewer is not assigned to this PR",
        ));
    }

    let old = store
        .users
        .get(&req.old_user_id)
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let mut exclude: Vec<&str> = pr.assigned_reviewers.iter().map(String::as_str).collect();
    exclude.push(&pr.author_id);
    let candidates = store.candidates(&old.team_name, &exclude);

    let Some(replacement) = pick(&candidates, 1).pop() else {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "NO_CANDIDATE",
            "no active replacement candidate in team",
        ));
    };

    let pr = store
        .pull_requests
        .get_mut(&req.pull_request_id)
        .ok_or_else(|| ApiError::not_found("pull request not found"))?;
    for reviewer in pr.assigned_reviewers.iter_mut() {
        if *reviewer == req.old_user_id {
            *reviewer = replacement.clone();
        }
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "pr": pr, "replaced_by": replacement })),
    ))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

async fn get_review(State(state): State<AppState>, Query(query): Query<UserQuery>) -> ApiResult {
    let store = state.store.read().await;
    let pull_requests: Vec<Value> = store
        .pull_requests
        .values()
        .filter(|pr| pr.assigned_reviewers.contains(&query.user_id))
        .map(|pr| {
            json!({
                "pull_request_id": pr.pull_request_id,
                "pull_request_name": pr.pull_request_name,
                "author_id": pr.author_id,
                "status": pr.status,
            })
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(json!({ "user_id": query.user_id, "pull_requests": pull_requests })),
    ))
}
