//! Backend traits and the HTTP implementation
//!
//! The session core and the attempt driver talk to the server through the
//! [`AuthBackend`] and [`QuizBackend`] trait objects so that tests can inject
//! scripted implementations. [`HttpBackend`] is the production implementation
//! over `reqwest`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::models::{
    AuthResponse, QuizAttemptResponse, QuizAttemptsPage, QuizForTaking, Quiz,
    RefreshTokenRequest, RefreshTokenResponse, SubmitQuizAttemptPayload, UserProfile,
};
use crate::settings::ApiSettings;

/// Failure taxonomy for outbound requests.
///
/// `Unauthorized` feeds the reactive-renewal path; `Forbidden` is surfaced
/// directly (valid session, insufficient rights) and never retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed (401)")]
    Unauthorized,
    #[error("permission denied (403)")]
    Forbidden,
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("session expired: {0}")]
    SessionExpired(crate::events::ExpiryReason),
    #[error("no active session")]
    NotAuthenticated,
    #[error("local storage failure: {0}")]
    Storage(String),
}

/// Authentication endpoints consumed by the session manager.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange a GitHub OAuth code for a token pair and user profile.
    async fn exchange_github_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthResponse, ApiError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh_tokens(&self, refresh_token: &str)
        -> Result<RefreshTokenResponse, ApiError>;

    /// Ask the server to invalidate a refresh token. Best effort.
    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), ApiError>;

    /// Cheap identity lookup used by periodic session validation.
    async fn fetch_user(&self, access_token: &str, id: &str) -> Result<UserProfile, ApiError>;
}

/// Quiz endpoints consumed by the attempt driver. Every call is
/// authenticated; the token is supplied by the request layer.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Question set with answers and explanations stripped.
    async fn quiz_for_taking(
        &self,
        access_token: &str,
        quiz_id: &str,
    ) -> Result<QuizForTaking, ApiError>;

    /// Question set with answers included. Creator or attempter only.
    async fn quiz_for_results(&self, access_token: &str, quiz_id: &str)
        -> Result<Quiz, ApiError>;

    /// Submit a complete answer list for grading.
    async fn submit_attempt(
        &self,
        access_token: &str,
        payload: &SubmitQuizAttemptPayload,
    ) -> Result<QuizAttemptResponse, ApiError>;

    /// Page through the caller's attempt history.
    async fn list_attempts(
        &self,
        access_token: &str,
        quiz_id: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QuizAttemptsPage, ApiError>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// `reqwest`-backed implementation of both backend traits.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base_url = Url::parse(&settings.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            status if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn exchange_github_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AuthResponse, ApiError> {
        let mut url = self.endpoint("/auth/github/callback")?;
        url.query_pairs_mut()
            .append_pair("code", code)
            .append_pair("redirect_uri", redirect_uri);

        let response = self.http.post(url).send().await?;
        Self::decode(response).await
    }

    async fn refresh_tokens(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshTokenResponse, ApiError> {
        let url = self.endpoint("/auth/refresh")?;
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self.http.post(url).json(&body).send().await?;
        Self::decode(response).await
    }

    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), ApiError> {
        let url = self.endpoint("/auth/logout")?;
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self.http.post(url).json(&body).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_user(&self, access_token: &str, id: &str) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&format!("/api/users/{id}"))?;

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl QuizBackend for HttpBackend {
    async fn quiz_for_taking(
        &self,
        access_token: &str,
        quiz_id: &str,
    ) -> Result<QuizForTaking, ApiError> {
        let url = self.endpoint(&format!("/api/quizzes/{quiz_id}/take"))?;

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        Self::decode(response).await
    }

    async fn quiz_for_results(
        &self,
        access_token: &str,
        quiz_id: &str,
    ) -> Result<Quiz, ApiError> {
        let url = self.endpoint(&format!("/api/quizzes/{quiz_id}/results"))?;

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        Self::decode(response).await
    }

    async fn submit_attempt(
        &self,
        access_token: &str,
        payload: &SubmitQuizAttemptPayload,
    ) -> Result<QuizAttemptResponse, ApiError> {
        let url = self.endpoint("/api/quizzes/attempts")?;

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn list_attempts(
        &self,
        access_token: &str,
        quiz_id: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QuizAttemptsPage, ApiError> {
        let mut url = self.endpoint("/api/quizzes/attempts")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(quiz_id) = quiz_id {
                pairs.append_pair("quiz_id", quiz_id);
            }
            pairs.append_pair("limit", &limit.to_string());
            pairs.append_pair("offset", &offset.to_string());
        }

        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        Self::decode(response).await
    }
}
