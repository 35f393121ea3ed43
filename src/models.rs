//! Wire types shared across the session and quiz subsystems
//!
//! These mirror the REST payloads of the Tento backend. Field names are
//! `snake_case` on the wire; question types and quiz status use the server's
//! PascalCase variant names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Authentication
// =============================================================================

/// Role attached to a user record. The server may omit it, in which case
/// [`UserRole::User`] is assumed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

/// Normalized user record persisted alongside the token pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub github_id: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial user data as delivered by the OAuth callback exchange.
///
/// Everything except the identity triple is optional; [`User::from_profile`]
/// fills in the defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub github_id: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<UserRole>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build a complete user record from a partial profile, defaulting the
    /// role to `user` and missing timestamps to the current time.
    #[must_use]
    pub fn from_profile(profile: UserProfile) -> Self {
        let now = Utc::now();
        Self {
            id: profile.id,
            username: profile.username,
            email: profile.email,
            full_name: profile.full_name,
            github_id: profile.github_id,
            avatar_url: profile.avatar_url,
            role: profile.role.unwrap_or_default(),
            created_at: profile.created_at.unwrap_or(now),
            updated_at: profile.updated_at.unwrap_or(now),
        }
    }
}

/// Response from `POST /auth/github/callback`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Option<UserRole>,
    pub full_name: Option<String>,
}

impl AuthResponse {
    /// Split the callback response into its token pair and user profile.
    #[must_use]
    pub fn into_parts(self) -> (String, String, UserProfile) {
        let profile = UserProfile {
            id: self.id,
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            role: self.role,
            ..UserProfile::default()
        };
        (self.token, self.refresh_token, profile)
    }
}

/// Request body for `POST /auth/refresh` and `POST /auth/logout`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Response from `POST /auth/refresh`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RefreshTokenResponse {
    pub token: String,
    pub refresh_token: String,
}

/// The active session: identity plus the token pair outbound requests use.
///
/// Exactly one session is live per client at a time. A session without a
/// refresh token cannot be renewed and expires with its access token.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// =============================================================================
// Quizzes
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizStatus {
    Draft,
    Pending,
    Ready,
    Complete,
}

/// Question type. `Single` and `Bool` accept at most one selected option;
/// `Multi` accepts any subset.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionType {
    Single,
    Multi,
    Bool,
}

impl QuestionType {
    /// Whether the selection set for this question type is limited to one.
    #[must_use]
    pub const fn is_single_select(self) -> bool {
        matches!(self, Self::Single | Self::Bool)
    }
}

/// Answer option as served to a quiz taker (correctness stripped).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OptionForTaking {
    pub id: String,
    pub text: String,
}

/// Answer option in the results view, correctness and explanation included.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
    pub correct: Option<bool>,
    pub explanation: Option<String>,
}

/// Question as served to a quiz taker.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuestionForTaking {
    pub id: String,
    pub title: String,
    pub description: String,
    pub question_type: QuestionType,
    pub options: Vec<OptionForTaking>,
    pub option_count: u32,
    pub order: u32,
    pub topic: String,
}

/// Quiz payload for the take-view: answers and explanations are stripped.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizForTaking {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_count: u32,
    pub required_score: u32,
    pub attempt_limit: u32,
    pub topic: Option<String>,
    pub status: QuizStatus,
    #[serde(default)]
    pub questions: Vec<QuestionForTaking>,
    pub url: String,
}

/// Question in the results view.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizQuestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
    pub option_count: u32,
    pub order: u32,
    pub topic: String,
}

/// Full quiz as returned by the results view (creator or attempter only).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Quiz {
    pub id: String,
    pub name: String,
    pub created_by_user_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_count: u32,
    pub required_score: u32,
    pub attempt_limit: u32,
    pub topic: Option<String>,
    pub status: QuizStatus,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Quiz attempts
// =============================================================================

/// Per-question answer entry in a submission payload. Unanswered questions
/// submit an empty `selected_option_ids`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QuestionAnswerSubmission {
    pub question_id: String,
    pub selected_option_ids: Vec<String>,
}

/// Body for the submit-attempt request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SubmitQuizAttemptPayload {
    pub quiz_id: String,
    pub answers: Vec<QuestionAnswerSubmission>,
}

/// Graded attempt as reported by the server. Authoritative once received.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizAttemptResponse {
    pub id: String,
    pub quiz_id: String,
    pub points_earned: u32,
    pub total_possible: u32,
    pub passed: bool,
    pub attempt_number: u32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct PaginationMeta {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
}

/// One page of attempt history.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizAttemptsPage {
    pub data: Vec<QuizAttemptResponse>,
    pub pagination: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_profile_defaults() {
        let profile = UserProfile {
            id: "u1".to_string(),
            username: "octocat".to_string(),
            email: "octo@example.com".to_string(),
            ..UserProfile::default()
        };

        let user = User::from_profile(profile);

        assert_eq!(user.role, UserRole::User);
        assert!(user.full_name.is_none());
        // Defaulted timestamps should be close to now
        let age = Utc::now() - user.created_at;
        assert!(age.num_seconds() < 5);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_user_from_profile_preserves_explicit_fields() {
        let created = Utc::now() - chrono::Duration::days(30);
        let profile = UserProfile {
            id: "u2".to_string(),
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            role: Some(UserRole::Admin),
            created_at: Some(created),
            ..UserProfile::default()
        };

        let user = User::from_profile(profile);

        assert_eq!(user.role, UserRole::Admin);
        assert_eq!(user.created_at, created);
    }

    #[test]
    fn test_auth_response_into_parts() {
        let response = AuthResponse {
            token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            id: "u1".to_string(),
            username: "octocat".to_string(),
            email: "octo@example.com".to_string(),
            role: None,
            full_name: Some("Octo Cat".to_string()),
        };

        let (access, refresh, profile) = response.into_parts();
        assert_eq!(access, "access");
        assert_eq!(refresh, "refresh");
        assert_eq!(profile.username, "octocat");
        assert_eq!(profile.full_name.as_deref(), Some("Octo Cat"));
        assert!(profile.role.is_none());
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(
            serde_json::to_string(&UserRole::Admin).unwrap(),
            "\"admin\""
        );
        let role: UserRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, UserRole::User);
    }

    #[test]
    fn test_question_type_selection_arity() {
        assert!(QuestionType::Single.is_single_select());
        assert!(QuestionType::Bool.is_single_select());
        assert!(!QuestionType::Multi.is_single_select());
    }

    #[test]
    fn test_quiz_for_taking_missing_questions_defaults_empty() {
        let json = serde_json::json!({
            "id": "q1",
            "name": "Rust basics",
            "title": null,
            "description": null,
            "question_count": 0,
            "required_score": 70,
            "attempt_limit": 3,
            "topic": null,
            "status": "Ready",
            "url": "rust-basics"
        });

        let quiz: QuizForTaking = serde_json::from_value(json).unwrap();
        assert!(quiz.questions.is_empty());
        assert_eq!(quiz.status, QuizStatus::Ready);
    }
}
