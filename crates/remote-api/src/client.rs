//! Quiz platform API client.

use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use quizsync_core::sync::{MutationKind, PendingMutation};
use quizsync_core::Collection;

use crate::error::{RemoteApiError, Result};
use crate::types::{ApiErrorResponse, ReferenceListResponse};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const HEALTH_TIMEOUT_SECS: u64 = 5;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Header carrying the client-generated key of an outbox entry.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone)]
pub struct QuizApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuizApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[QuizSync] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[QuizSync] API response error ({}): {}", status, preview);
    }

    /// Create a client for the API rooted at `base_url`
    /// (e.g. "https://api.example.org/v1").
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(RemoteApiError::invalid_request("API base URL is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, token: Option<&str>, idempotency_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteApiError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        if let Some(key) = idempotency_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|_| RemoteApiError::invalid_request("Invalid idempotency key format"))?;
            headers.insert(IDEMPOTENCY_KEY_HEADER, key_value);
        }

        Ok(headers)
    }

    /// Turns a non-2xx response into an `Api` error; returns the body otherwise.
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(body);
        }
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            let message = if error.code.is_empty() {
                error.message
            } else {
                format!("{}: {}", error.code, error.message)
            };
            return Err(RemoteApiError::api(status.as_u16(), message));
        }
        Err(RemoteApiError::api(
            status.as_u16(),
            format!("Request failed: {}", body),
        ))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!("[QuizSync] Failed to deserialize response: {}", e);
            RemoteApiError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    fn bearer(token: &str) -> Result<&str> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RemoteApiError::auth("No access token captured"));
        }
        Ok(token)
    }

    /// Record a finished quiz.
    ///
    /// POST /quiz-results
    pub async fn submit_quiz_result(
        &self,
        token: &str,
        idempotency_key: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/quiz-results", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(Some(Self::bearer(token)?), Some(idempotency_key))?)
            .json(payload)
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    /// Replace the learner's progress document.
    ///
    /// PUT /user/progress
    pub async fn update_progress(
        &self,
        token: &str,
        idempotency_key: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/user/progress", self.base_url);
        let response = self
            .client
            .put(&url)
            .headers(self.headers(Some(Self::bearer(token)?), Some(idempotency_key))?)
            .json(payload)
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    /// POST /user/badges
    pub async fn award_badge(
        &self,
        token: &str,
        idempotency_key: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/user/badges", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(Some(Self::bearer(token)?), Some(idempotency_key))?)
            .json(payload)
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }

    /// Sends one outbox entry to the endpoint matching its kind, using the
    /// token captured when it was queued.
    pub async fn deliver_mutation(&self, mutation: &PendingMutation) -> Result<()> {
        debug!(
            "[QuizSync] Sending {} id={} attempt={}",
            mutation.kind.as_str(),
            mutation.id,
            mutation.attempts + 1
        );
        let token = mutation.auth_snapshot.as_str();
        let key = mutation.idempotency_key.as_str();
        match mutation.kind {
            MutationKind::QuizResult => self.submit_quiz_result(token, key, &mutation.payload).await,
            MutationKind::UserProgress => self.update_progress(token, key, &mutation.payload).await,
            MutationKind::BadgeEarned => self.award_badge(token, key, &mutation.payload).await,
        }
    }

    /// GET /quizzes or GET /animals
    pub async fn fetch_reference_list(
        &self,
        collection: Collection,
        token: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let path = match collection {
            Collection::Quizzes => "quizzes",
            Collection::Animals => "animals",
            other => {
                return Err(RemoteApiError::invalid_request(format!(
                    "No remote endpoint for '{}'",
                    other
                )))
            }
        };
        let url = format!("{}/{}", self.base_url, path);
        let token = token.map(str::trim).filter(|token| !token.is_empty());
        let response = self
            .client
            .get(&url)
            .headers(self.headers(token, None)?)
            .send()
            .await?;
        let list: ReferenceListResponse = Self::parse_response(response).await?;
        Ok(list.into_items())
    }

    /// GET /health
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await?;
        Self::read_body(response).await.map(|_| ())
    }
}
