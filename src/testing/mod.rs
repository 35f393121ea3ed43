//! Test fixtures and scripted backends
//!
//! Compiled for the crate's own tests and for downstream integration tests
//! behind the `testing` feature. Provides signed-looking JWTs with chosen
//! claims, a standard user profile, a three-question quiz fixture, and mock
//! implementations of the backend traits whose behavior is scripted per test.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::api::{ApiError, AuthBackend, QuizBackend};
use crate::models::{
    AuthResponse, OptionForTaking, QuestionForTaking, QuestionOption, QuestionType, Quiz,
    QuizAttemptResponse, QuizAttemptsPage, QuizForTaking, QuizQuestion, QuizStatus,
    PaginationMeta, RefreshTokenResponse, SubmitQuizAttemptPayload, UserProfile,
};

// =============================================================================
// Tokens
// =============================================================================

/// Unsigned-but-well-formed JWT with the given subject and expiry.
#[must_use]
pub fn token_with(sub: &str, exp: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": sub,
        "exp": exp.timestamp(),
        "iat": Utc::now().timestamp(),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode("test-signature");
    format!("{header}.{payload}.{signature}")
}

/// Token that expires an hour from now.
#[must_use]
pub fn unexpired_token() -> String {
    token_with("test-user", Utc::now() + chrono::Duration::hours(1))
}

/// Token that expired an hour ago.
#[must_use]
pub fn expired_token() -> String {
    token_with("test-user", Utc::now() - chrono::Duration::hours(1))
}

// =============================================================================
// Fixtures
// =============================================================================

pub struct TestProfile;

impl TestProfile {
    /// Minimal profile with only the identity triple set.
    #[must_use]
    pub fn standard() -> UserProfile {
        UserProfile {
            id: "u1".to_string(),
            username: "octocat".to_string(),
            email: "octo@example.com".to_string(),
            ..UserProfile::default()
        }
    }
}

/// Three-question quiz covering every question type: `q1` Single, `q2`
/// Multi, `q3` Bool. Attempt limit 3.
#[must_use]
pub fn quiz_fixture() -> QuizForTaking {
    QuizForTaking {
        id: "quiz-1".to_string(),
        name: "rust-basics".to_string(),
        title: Some("Rust Basics".to_string()),
        description: None,
        question_count: 3,
        required_score: 70,
        attempt_limit: 3,
        topic: Some("rust".to_string()),
        status: QuizStatus::Ready,
        questions: vec![
            question(
                "q1",
                QuestionType::Single,
                1,
                &[("q1-a", "Box"), ("q1-b", "Rc"), ("q1-c", "Arc")],
            ),
            question(
                "q2",
                QuestionType::Multi,
                2,
                &[("q2-a", "Send"), ("q2-b", "Sync"), ("q2-c", "Copy")],
            ),
            question(
                "q3",
                QuestionType::Bool,
                3,
                &[("q3-true", "True"), ("q3-false", "False")],
            ),
        ],
        url: "rust-basics".to_string(),
    }
}

/// Graded server response for the fixture quiz.
#[must_use]
pub fn graded_result(attempt_number: u32) -> QuizAttemptResponse {
    QuizAttemptResponse {
        id: format!("attempt-{attempt_number}"),
        quiz_id: "quiz-1".to_string(),
        points_earned: 2,
        total_possible: 3,
        passed: false,
        attempt_number,
        submitted_at: Utc::now(),
    }
}

fn question(
    id: &str,
    question_type: QuestionType,
    order: u32,
    options: &[(&str, &str)],
) -> QuestionForTaking {
    QuestionForTaking {
        id: id.to_string(),
        title: format!("Question {order}"),
        description: String::new(),
        question_type,
        options: options
            .iter()
            .map(|(id, text)| OptionForTaking {
                id: (*id).to_string(),
                text: (*text).to_string(),
            })
            .collect(),
        option_count: u32::try_from(options.len()).unwrap_or(0),
        order,
        topic: "rust".to_string(),
    }
}

/// Results view of the fixture quiz, first option of each question marked
/// correct.
fn results_from(quiz: &QuizForTaking) -> Quiz {
    Quiz {
        id: quiz.id.clone(),
        name: quiz.name.clone(),
        created_by_user_id: "creator-1".to_string(),
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        question_count: quiz.question_count,
        required_score: quiz.required_score,
        attempt_limit: quiz.attempt_limit,
        topic: quiz.topic.clone(),
        status: quiz.status,
        questions: quiz
            .questions
            .iter()
            .map(|q| QuizQuestion {
                id: q.id.clone(),
                title: q.title.clone(),
                description: q.description.clone(),
                question_type: q.question_type,
                options: q
                    .options
                    .iter()
                    .enumerate()
                    .map(|(i, o)| QuestionOption {
                        id: o.id.clone(),
                        text: o.text.clone(),
                        correct: Some(i == 0),
                        explanation: None,
                    })
                    .collect(),
                option_count: q.option_count,
                order: q.order,
                topic: q.topic.clone(),
            })
            .collect(),
        url: quiz.url.clone(),
        created_at: None,
        modified_at: None,
    }
}

// =============================================================================
// Mock auth backend
// =============================================================================

/// Scripted [`AuthBackend`]. Defaults: code exchange succeeds with the
/// standard profile, refresh fails (script a response to make it succeed),
/// revocation succeeds, user lookup succeeds.
#[derive(Default)]
pub struct MockAuthBackend {
    refresh_response: Mutex<Option<RefreshTokenResponse>>,
    refresh_delay: Option<std::time::Duration>,
    fail_refresh: bool,
    fail_user_lookup: bool,
    refresh_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
}

impl MockAuthBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token pair the next refresh calls will return.
    #[must_use]
    pub fn with_refresh_response(self, response: RefreshTokenResponse) -> Self {
        *lock(&self.refresh_response) = Some(response);
        self
    }

    /// Make every refresh call fail with a 401.
    #[must_use]
    pub fn with_refresh_failure(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    /// Hold each refresh call open for `delay` so tests can pile up
    /// concurrent callers behind it.
    #[must_use]
    pub fn with_refresh_delay(mut self, delay: std::time::Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Make every user lookup fail with a 401.
    #[must_use]
    pub fn with_user_lookup_failure(mut self) -> Self {
        self.fail_user_lookup = true;
        self
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn exchange_github_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<AuthResponse, ApiError> {
        let profile = TestProfile::standard();
        Ok(AuthResponse {
            token: unexpired_token(),
            refresh_token: "refresh-1".to_string(),
            id: profile.id,
            username: profile.username,
            email: profile.email,
            role: None,
            full_name: None,
        })
    }

    async fn refresh_tokens(
        &self,
        _refresh_token: &str,
    ) -> Result<RefreshTokenResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refresh {
            return Err(ApiError::Unauthorized);
        }
        lock(&self.refresh_response)
            .clone()
            .ok_or(ApiError::Unauthorized)
    }

    async fn revoke_refresh_token(&self, _refresh_token: &str) -> Result<(), ApiError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_user(&self, _access_token: &str, _id: &str) -> Result<UserProfile, ApiError> {
        if self.fail_user_lookup {
            return Err(ApiError::Unauthorized);
        }
        Ok(TestProfile::standard())
    }
}

// =============================================================================
// Mock quiz backend
// =============================================================================

/// Scripted [`QuizBackend`] serving one fixed quiz. Submissions succeed by
/// default with an attempt number that counts up per call; the first N calls
/// of any operation can be made to return 401 via
/// [`MockQuizBackend::with_unauthorized_calls`].
pub struct MockQuizBackend {
    quiz: QuizForTaking,
    results: Quiz,
    unauthorized_remaining: AtomicU32,
    results_forbidden: bool,
    fail_submit: bool,
    submit_delay: Option<std::time::Duration>,
    taking_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    submissions: Mutex<Vec<SubmitQuizAttemptPayload>>,
    attempts: Mutex<Vec<QuizAttemptResponse>>,
}

impl MockQuizBackend {
    #[must_use]
    pub fn new(quiz: QuizForTaking) -> Self {
        let results = results_from(&quiz);
        Self {
            quiz,
            results,
            unauthorized_remaining: AtomicU32::new(0),
            results_forbidden: false,
            fail_submit: false,
            submit_delay: None,
            taking_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `n` calls of any operation fail with a 401.
    #[must_use]
    pub fn with_unauthorized_calls(self, n: u32) -> Self {
        self.arm_unauthorized(n);
        self
    }

    /// Arm the 401 budget mid-test, after earlier calls already succeeded.
    pub fn arm_unauthorized(&self, n: u32) {
        self.unauthorized_remaining.store(n, Ordering::SeqCst);
    }

    /// Make the results view fail with a 403.
    #[must_use]
    pub fn with_results_forbidden(mut self) -> Self {
        self.results_forbidden = true;
        self
    }

    /// Make every submission fail with a 500.
    #[must_use]
    pub fn with_submit_failure(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// Hold each submission open for `delay` so tests can observe the
    /// in-flight state.
    #[must_use]
    pub fn with_submit_delay(mut self, delay: std::time::Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn taking_calls(&self) -> usize {
        self.taking_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Most recent submission payload received, if any.
    #[must_use]
    pub fn last_submission(&self) -> Option<SubmitQuizAttemptPayload> {
        lock(&self.submissions).last().cloned()
    }

    fn check_unauthorized(&self) -> Result<(), ApiError> {
        let remaining = self.unauthorized_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unauthorized_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl QuizBackend for MockQuizBackend {
    async fn quiz_for_taking(
        &self,
        _access_token: &str,
        quiz_id: &str,
    ) -> Result<QuizForTaking, ApiError> {
        self.taking_calls.fetch_add(1, Ordering::SeqCst);
        self.check_unauthorized()?;
        if quiz_id == self.quiz.id {
            Ok(self.quiz.clone())
        } else {
            Err(ApiError::Status {
                status: 404,
                message: "quiz not found".to_string(),
            })
        }
    }

    async fn quiz_for_results(
        &self,
        _access_token: &str,
        quiz_id: &str,
    ) -> Result<Quiz, ApiError> {
        self.check_unauthorized()?;
        if self.results_forbidden {
            return Err(ApiError::Forbidden);
        }
        if quiz_id == self.results.id {
            Ok(self.results.clone())
        } else {
            Err(ApiError::Status {
                status: 404,
                message: "quiz not found".to_string(),
            })
        }
    }

    async fn submit_attempt(
        &self,
        _access_token: &str,
        payload: &SubmitQuizAttemptPayload,
    ) -> Result<QuizAttemptResponse, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_unauthorized()?;
        lock(&self.submissions).push(payload.clone());
        if self.fail_submit {
            return Err(ApiError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        let mut attempts = lock(&self.attempts);
        let result = graded_result(u32::try_from(attempts.len()).unwrap_or(0) + 1);
        attempts.push(result.clone());
        Ok(result)
    }

    async fn list_attempts(
        &self,
        _access_token: &str,
        quiz_id: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QuizAttemptsPage, ApiError> {
        self.check_unauthorized()?;
        let attempts = lock(&self.attempts);
        let filtered: Vec<QuizAttemptResponse> = attempts
            .iter()
            .filter(|a| quiz_id.is_none_or(|id| a.quiz_id == id))
            .cloned()
            .collect();
        let total = u64::try_from(filtered.len()).unwrap_or(0);
        let data = filtered
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(QuizAttemptsPage {
            data,
            pagination: PaginationMeta {
                offset,
                limit,
                total,
            },
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
