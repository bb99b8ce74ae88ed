//! Boundary adapter for the target service.
//!
//! Every call returns the raw status code, the body and the elapsed time. Interpreting them is
//! left to the dispatcher.
use prload_core::Team;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Normalized response of a single call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

/// The six calls the load generator issues.
///
/// Implemented over HTTP by [`ApiClient`]. The `Send` variant (`TargetApi`) is what the engine
/// requires, since iterations run on spawned tasks.
#[trait_variant::make(TargetApi: Send)]
pub trait LocalTargetApi {
    async fn create_team(&self, team: &Team) -> Result<ApiResponse, ClientError>;

    async fn get_team(&self, team_name: &str) -> Result<ApiResponse, ClientError>;

    async fn create_pull_request(
        &self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> Result<ApiResponse, ClientError>;

    async fn get_review(&self, user_id: &str) -> Result<ApiResponse, ClientError>;

    async fn merge_pull_request(&self, pull_request_id: &str)
        -> Result<ApiResponse, ClientError>;

    async fn reassign_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
    ) -> Result<ApiResponse, ClientError>;
}

#[derive(Serialize)]
struct CreatePullRequestBody<'a> {
    pull_request_id: &'a str,
    pull_request_name: &'a str,
    author_id: &'a str,
}

#[derive(Serialize)]
struct MergePullRequestBody<'a> {
    pull_request_id: &'a str,
}

#[derive(Serialize)]
struct ReassignBody<'a> {
    pull_request_id: &'a str,
    old_user_id: &'a str,
}

/// HTTP implementation of [`TargetApi`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn classify(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(err)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<ApiResponse, ClientError> {
        let start = Instant::now();
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        Ok(ApiResponse {
            status,
            body,
            elapsed: start.elapsed(),
        })
    }
}

impl TargetApi for ApiClient {
    async fn create_team(&self, team: &Team) -> Result<ApiResponse, ClientError> {
        self.send(self.client.post(self.url("/team/add")).json(team))
            .await
    }

    async fn get_team(&self, team_name: &str) -> Result<ApiResponse, ClientError> {
        self.send(
            self.client
                .get(self.url("/team/get"))
                .query(&[("team_name", team_name)]),
        )
        .await
    }

    async fn create_pull_request(
        &self,
        pull_request_id: &str,
        pull_request_name: &str,
        author_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        let body = CreatePullRequestBody {
            pull_request_id,
            pull_request_name,
            author_id,
        };
        self.send(self.client.post(self.url("/pullRequest/create")).json(&body))
            .await
    }

    async fn get_review(&self, user_id: &str) -> Result<ApiResponse, ClientError> {
        self.send(
            self.client
                .get(self.url("/users/getReview"))
                .query(&[("user_id", user_id)]),
        )
        .await
    }

    async fn merge_pull_request(
        &self,
        pull_request_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        let body = MergePullRequestBody { pull_request_id };
        self.send(self.client.post(self.url("/pullRequest/merge")).json(&body))
            .await
    }

    async fn reassign_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
    ) -> Result<ApiResponse, ClientError> {
        let body = ReassignBody {
            pull_request_id,
            old_user_id,
        };
        self.send(self.client.post(self.url("/pullRequest/reassign")).json(&body))
            .await
    }
}
