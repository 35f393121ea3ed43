//! Authenticated request layer
//!
//! Wraps a [`QuizBackend`] with the session's bearer token and the reactive
//! renewal contract: a request that comes back 401 triggers exactly one
//! refresh round through the session manager's gate and is then retried with
//! the new token. Authorization failures (403) are surfaced directly and
//! never retried.

use std::future::Future;
use std::sync::Arc;

use crate::api::backend::{ApiError, QuizBackend};
use crate::models::{
    Quiz, QuizAttemptResponse, QuizAttemptsPage, QuizForTaking, SubmitQuizAttemptPayload,
};
use crate::session::{SessionError, SessionManager};

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired(reason) => Self::SessionExpired(reason),
            SessionError::NotAuthenticated => Self::NotAuthenticated,
            SessionError::Api(inner) => inner,
            SessionError::Store(e) => Self::Storage(e.to_string()),
        }
    }
}

/// Typed, authenticated access to the quiz endpoints.
#[derive(Clone)]
pub struct ApiClient {
    session: Arc<SessionManager>,
    quiz: Arc<dyn QuizBackend>,
}

impl ApiClient {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, quiz: Arc<dyn QuizBackend>) -> Self {
        Self { session, quiz }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// # Errors
    ///
    /// Returns an error if there is no active session or the request fails
    /// after one renewal round.
    pub async fn quiz_for_taking(&self, quiz_id: &str) -> Result<QuizForTaking, ApiError> {
        self.with_auth_retry(|token| async move {
            self.quiz.quiz_for_taking(&token, quiz_id).await
        })
        .await
    }

    /// Results view of a quiz, answers included. The server enforces that
    /// only the creator or an attempter may read it; a 403 here is final.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active session or the request fails
    /// after one renewal round.
    pub async fn quiz_for_results(&self, quiz_id: &str) -> Result<Quiz, ApiError> {
        self.with_auth_retry(|token| async move {
            self.quiz.quiz_for_results(&token, quiz_id).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if there is no active session or the request fails
    /// after one renewal round.
    pub async fn submit_attempt(
        &self,
        payload: &SubmitQuizAttemptPayload,
    ) -> Result<QuizAttemptResponse, ApiError> {
        self.with_auth_retry(|token| async move {
            self.quiz.submit_attempt(&token, payload).await
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error if there is no active session or the request fails
    /// after one renewal round.
    pub async fn list_attempts(
        &self,
        quiz_id: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QuizAttemptsPage, ApiError> {
        self.with_auth_retry(|token| async move {
            self.quiz
                .list_attempts(&token, quiz_id, limit, offset)
                .await
        })
        .await
    }

    /// Run an authenticated call, renewing the token once on a 401.
    ///
    /// Concurrent 401s from parallel requests collapse into a single refresh
    /// inside [`SessionManager::handle_unauthorized`]; all of them either
    /// retry with the same new token or fail together.
    async fn with_auth_retry<T, Fut>(
        &self,
        call: impl Fn(String) -> Fut,
    ) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self
            .session
            .access_token()
            .ok_or(ApiError::NotAuthenticated)?;

        match call(token.clone()).await {
            Err(ApiError::Unauthorized) => {
                log::debug!("request unauthorized, attempting token renewal");
                let renewed = self.session.handle_unauthorized(&token).await?;
                call(renewed).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::models::RefreshTokenResponse;
    use crate::settings::SessionSettings;
    use crate::storage::MemoryStore;
    use crate::testing::{
        quiz_fixture, token_with, unexpired_token, MockAuthBackend, MockQuizBackend, TestProfile,
    };

    fn client(auth: Arc<MockAuthBackend>, quiz: Arc<MockQuizBackend>) -> ApiClient {
        let session = Arc::new(SessionManager::new(
            Arc::new(MemoryStore::new()),
            auth,
            EventBus::new(),
            SessionSettings::default(),
        ));
        session
            .login(
                &token_with("old", chrono::Utc::now() + chrono::Duration::hours(1)),
                "refresh-1",
                TestProfile::standard(),
            )
            .unwrap();
        ApiClient::new(session, quiz)
    }

    #[tokio::test]
    async fn test_request_passes_through_on_success() {
        let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));
        let client = client(Arc::new(MockAuthBackend::new()), quiz.clone());

        let fetched = client.quiz_for_taking("quiz-1").await.unwrap();
        assert_eq!(fetched.id, "quiz-1");
        assert_eq!(quiz.taking_calls(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_request_renews_and_retries_once() {
        let auth = Arc::new(MockAuthBackend::new().with_refresh_response(
            RefreshTokenResponse {
                token: unexpired_token(),
                refresh_token: "refresh-2".to_string(),
            },
        ));
        let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()).with_unauthorized_calls(1));
        let client = client(auth.clone(), quiz.clone());

        let fetched = client.quiz_for_taking("quiz-1").await.unwrap();

        assert_eq!(fetched.id, "quiz-1");
        assert_eq!(auth.refresh_calls(), 1);
        // Original call plus one retry with the renewed token
        assert_eq!(quiz.taking_calls(), 2);
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_fails_after_one_retry() {
        let auth = Arc::new(MockAuthBackend::new().with_refresh_response(
            RefreshTokenResponse {
                token: unexpired_token(),
                refresh_token: "refresh-2".to_string(),
            },
        ));
        let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()).with_unauthorized_calls(99));
        let client = client(auth.clone(), quiz.clone());

        let result = client.quiz_for_taking("quiz-1").await;

        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(auth.refresh_calls(), 1);
        assert_eq!(quiz.taking_calls(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let auth = Arc::new(MockAuthBackend::new());
        let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()).with_results_forbidden());
        let client = client(auth.clone(), quiz.clone());

        let result = client.quiz_for_results("quiz-1").await;

        assert!(matches!(result, Err(ApiError::Forbidden)));
        assert_eq!(auth.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_request_without_session_is_rejected_locally() {
        let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));
        let session = Arc::new(SessionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockAuthBackend::new()),
            EventBus::new(),
            SessionSettings::default(),
        ));
        let client = ApiClient::new(session, quiz.clone());

        let result = client.quiz_for_taking("quiz-1").await;

        assert!(matches!(result, Err(ApiError::NotAuthenticated)));
        assert_eq!(quiz.taking_calls(), 0);
    }
}
