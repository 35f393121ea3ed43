//! End-to-end attempt flow: fetch, answer, submit, recover and retake over
//! scripted backends.

use std::sync::Arc;

use tento_core::api::ApiClient;
use tento_core::events::EventBus;
use tento_core::quiz::{QuizAttemptSession, QuizSessionError, SubmissionState};
use tento_core::session::SessionManager;
use tento_core::settings::SessionSettings;
use tento_core::storage::{FileStore, MemoryStore, SessionStore};
use tento_core::testing::{
    quiz_fixture, unexpired_token, MockAuthBackend, MockQuizBackend, TestProfile,
};

fn driver_over(
    auth: Arc<MockAuthBackend>,
    quiz: Arc<MockQuizBackend>,
    store: Arc<dyn SessionStore>,
) -> QuizAttemptSession {
    let session = Arc::new(SessionManager::new(
        store.clone(),
        auth,
        EventBus::new(),
        SessionSettings::default(),
    ));
    session
        .login(&unexpired_token(), "refresh-1", TestProfile::standard())
        .unwrap();
    QuizAttemptSession::new(ApiClient::new(session, quiz), store, true)
}

fn driver(quiz: Arc<MockQuizBackend>) -> QuizAttemptSession {
    driver_over(
        Arc::new(MockAuthBackend::new()),
        quiz,
        Arc::new(MemoryStore::new()),
    )
}

#[tokio::test]
async fn test_full_three_question_attempt() {
    let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));
    let driver = driver(quiz.clone());

    driver.start_attempt("quiz-1").await.unwrap();

    // Single, Multi and Bool questions answered in order
    driver.select_answer("q1", "q1-a", true).unwrap();
    driver.next_question().unwrap();
    driver.select_answer("q2", "q2-b", true).unwrap();
    driver.select_answer("q2", "q2-c", true).unwrap();
    driver.next_question().unwrap();
    let state = driver.select_answer("q3", "q3-false", true).unwrap();

    assert_eq!(state.answered_count(), 3);
    assert!(state.is_last_question());

    let result = driver.submit().await.unwrap();
    assert_eq!(result.quiz_id, "quiz-1");
    assert_eq!(result.attempt_number, 1);

    let payload = quiz.last_submission().unwrap();
    assert_eq!(payload.answers.len(), 3);
    assert_eq!(payload.answers[0].question_id, "q1");
    assert_eq!(payload.answers[0].selected_option_ids, vec!["q1-a"]);
    assert_eq!(payload.answers[1].selected_option_ids, vec!["q2-b", "q2-c"]);
    assert_eq!(payload.answers[2].selected_option_ids, vec!["q3-false"]);
}

#[tokio::test]
async fn test_skipped_question_submits_empty_selection() {
    let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));
    let driver = driver(quiz.clone());

    driver.start_attempt("quiz-1").await.unwrap();
    driver.select_answer("q1", "q1-b", true).unwrap();
    driver.select_answer("q3", "q3-true", true).unwrap();

    driver.submit().await.unwrap();

    let payload = quiz.last_submission().unwrap();
    assert_eq!(payload.answers.len(), 3);
    assert_eq!(payload.answers[1].question_id, "q2");
    assert!(payload.answers[1].selected_option_ids.is_empty());
}

#[tokio::test]
async fn test_interrupted_attempt_recovers_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));

    {
        let store = Arc::new(FileStore::new(&path));
        let driver = driver_over(Arc::new(MockAuthBackend::new()), quiz.clone(), store);
        driver.start_attempt("quiz-1").await.unwrap();
        driver.select_answer("q1", "q1-c", true).unwrap();
        driver.select_answer("q2", "q2-a", true).unwrap();
        // Dropped without submitting
    }

    let store = Arc::new(FileStore::new(&path));
    let driver = driver_over(Arc::new(MockAuthBackend::new()), quiz, store);
    let state = driver.start_attempt("quiz-1").await.unwrap();

    assert_eq!(state.answered_count(), 2);
    assert!(state.answers()["q1"].contains("q1-c"));
    assert!(state.answers()["q2"].contains("q2-a"));
}

#[tokio::test]
async fn test_submission_cache_is_dropped_after_grading() {
    let store = Arc::new(MemoryStore::new());
    let driver = driver_over(
        Arc::new(MockAuthBackend::new()),
        Arc::new(MockQuizBackend::new(quiz_fixture())),
        store.clone(),
    );

    driver.start_attempt("quiz-1").await.unwrap();
    driver.select_answer("q1", "q1-a", true).unwrap();
    assert!(store.cached_answers("quiz-1").unwrap().is_some());

    driver.submit().await.unwrap();

    assert!(store.cached_answers("quiz-1").unwrap().is_none());
}

#[tokio::test]
async fn test_retake_reshuffles_and_clears_answers() {
    let driver = driver(Arc::new(MockQuizBackend::new(quiz_fixture())));

    driver.start_attempt("quiz-1").await.unwrap();
    let first = driver.select_answer("q1", "q1-a", true).unwrap();
    driver.submit().await.unwrap();

    let second = driver.retake().unwrap();

    assert_eq!(second.attempt_number(), 2);
    assert!(second.answers().is_empty());
    assert!(matches!(second.submission(), SubmissionState::InProgress));

    // Same questions, possibly in a new order
    let mut first_ids: Vec<&str> = first.questions().iter().map(|q| q.id.as_str()).collect();
    let mut second_ids: Vec<&str> = second.questions().iter().map(|q| q.id.as_str()).collect();
    first_ids.sort_unstable();
    second_ids.sort_unstable();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_attempt_limit_is_enforced_across_attempts() {
    let driver = driver(Arc::new(MockQuizBackend::new(quiz_fixture())));

    for expected in 1..=3 {
        let state = driver.start_attempt("quiz-1").await.unwrap();
        assert_eq!(state.attempt_number(), expected);
        driver.submit().await.unwrap();
    }

    let result = driver.start_attempt("quiz-1").await;
    assert!(matches!(
        result,
        Err(QuizSessionError::AttemptLimitReached {
            attempts: 3,
            limit: 3
        })
    ));
}

#[tokio::test]
async fn test_submission_survives_token_renewal() {
    let auth = Arc::new(MockAuthBackend::new().with_refresh_response(
        tento_core::models::RefreshTokenResponse {
            token: unexpired_token(),
            refresh_token: "refresh-2".to_string(),
        },
    ));
    let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()));
    let driver = driver_over(auth.clone(), quiz.clone(), Arc::new(MemoryStore::new()));
    driver.start_attempt("quiz-1").await.unwrap();
    driver.select_answer("q1", "q1-a", true).unwrap();

    // The grading request itself comes back 401 once; it must be replayed
    // with a renewed token, not double-graded
    quiz.arm_unauthorized(1);
    let result = driver.submit().await.unwrap();

    assert_eq!(result.attempt_number, 1);
    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(quiz.submit_calls(), 2);
    assert_eq!(quiz.last_submission().unwrap().answers.len(), 3);
}
