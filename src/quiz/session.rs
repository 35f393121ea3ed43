//! Attempt driver
//!
//! Owns one [`AttemptState`] and applies its transitions around the network
//! calls: fetching the take-view, grading, retakes and the results view. All
//! answer selections are mirrored into the recovery cache so an interrupted
//! attempt can restore them; the cache entry is dropped once the server has
//! accepted a submission.
//!
//! State sits behind a std mutex that is never held across an await. A
//! submission marks the state `Submitting` before the lock is released, which
//! is what rejects a second concurrent submit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::models::{Quiz, QuizAttemptResponse, QuizAttemptsPage, QuizForTaking};
use crate::quiz::attempt::{AttemptError, AttemptState};
use crate::storage::SessionStore;

#[derive(Debug, Error)]
pub enum QuizSessionError {
    #[error("no active attempt")]
    NoAttempt,
    #[error("attempt limit reached ({attempts} of {limit})")]
    AttemptLimitReached { attempts: u32, limit: u32 },
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

struct ActiveAttempt {
    quiz: QuizForTaking,
    state: AttemptState,
}

/// Drives one user's pass through a quiz against the server.
pub struct QuizAttemptSession {
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    cache_enabled: bool,
    active: Mutex<Option<ActiveAttempt>>,
}

impl QuizAttemptSession {
    #[must_use]
    pub fn new(api: ApiClient, store: Arc<dyn SessionStore>, cache_enabled: bool) -> Self {
        Self {
            api,
            store,
            cache_enabled,
            active: Mutex::new(None),
        }
    }

    // =========================================================================
    // Attempt lifecycle
    // =========================================================================

    /// Fetch the take-view of a quiz and begin an attempt over it.
    ///
    /// The attempt number is one past the caller's prior attempt count for
    /// this quiz; cached answers from an interrupted attempt are restored
    /// into the fresh state.
    ///
    /// # Errors
    ///
    /// Returns an error if the quiz cannot be fetched, the attempt limit is
    /// already reached, or the quiz has no questions.
    pub async fn start_attempt(&self, quiz_id: &str) -> Result<AttemptState, QuizSessionError> {
        let quiz = self.api.quiz_for_taking(quiz_id).await?;
        let prior = self.api.list_attempts(Some(quiz_id), 1, 0).await?;
        let attempts = u32::try_from(prior.pagination.total).unwrap_or(u32::MAX);
        if attempts >= quiz.attempt_limit {
            return Err(QuizSessionError::AttemptLimitReached {
                attempts,
                limit: quiz.attempt_limit,
            });
        }

        let mut state = AttemptState::start(&quiz, attempts + 1)?;
        if self.cache_enabled {
            match self.store.cached_answers(quiz_id) {
                Ok(Some(cached)) => {
                    log::info!("restoring cached answers for quiz {quiz_id}");
                    state = state.restore_answers(cached);
                }
                Ok(None) => {}
                Err(e) => log::warn!("failed to read answer cache: {e}"),
            }
        }

        *self.active_guard() = Some(ActiveAttempt {
            quiz,
            state: state.clone(),
        });
        log::info!(
            "started attempt {} on quiz {quiz_id}",
            state.attempt_number()
        );
        Ok(state)
    }

    /// Submit the current attempt for grading.
    ///
    /// The answer list covers every question, unanswered ones with an empty
    /// selection. On success the recovery cache entry is dropped; on failure
    /// the attempt rolls back to in-progress with answers intact so it can
    /// be retried. A second submit while one is in flight is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active attempt, a submission is
    /// already in flight, or the server rejects the request.
    pub async fn submit(&self) -> Result<QuizAttemptResponse, QuizSessionError> {
        let (quiz_id, payload) = {
            let mut guard = self.active_guard();
            let active = guard.as_mut().ok_or(QuizSessionError::NoAttempt)?;
            active.state = active.state.begin_submit()?;
            (active.quiz.id.clone(), active.state.submission_payload())
        };

        match self.api.submit_attempt(&payload).await {
            Ok(result) => {
                let mut guard = self.active_guard();
                if let Some(active) = guard.as_mut() {
                    match active.state.complete_submit(result.clone()) {
                        Ok(state) => active.state = state,
                        Err(stale) => {
                            log::debug!("skipping submit completion: {stale}");
                        }
                    }
                }
                drop(guard);
                if self.cache_enabled {
                    if let Err(e) = self.store.clear_cached_answers(&quiz_id) {
                        log::warn!("failed to drop answer cache after submission: {e}");
                    }
                }
                log::info!(
                    "attempt {} on quiz {quiz_id} graded: {}/{}",
                    result.attempt_number,
                    result.points_earned,
                    result.total_possible
                );
                Ok(result)
            }
            Err(e) => {
                let mut guard = self.active_guard();
                if let Some(active) = guard.as_mut() {
                    // The attempt may have been abandoned and restarted while
                    // the request was in flight; the server error still wins.
                    match active.state.fail_submit() {
                        Ok(state) => active.state = state,
                        Err(rollback) => {
                            log::debug!("skipping submit rollback: {rollback}");
                        }
                    }
                }
                drop(guard);
                log::warn!("submission for quiz {quiz_id} failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Begin a fresh attempt over the same quiz after a graded one. Any
    /// cached answers from the previous attempt are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no submitted attempt or the quiz's
    /// attempt limit is reached.
    pub fn retake(&self) -> Result<AttemptState, QuizSessionError> {
        let quiz_id;
        let state;
        {
            let mut guard = self.active_guard();
            let active = guard.as_mut().ok_or(QuizSessionError::NoAttempt)?;
            state = active.state.retake(&active.quiz)?;
            active.state = state.clone();
            quiz_id = active.quiz.id.clone();
        }

        if self.cache_enabled {
            if let Err(e) = self.store.clear_cached_answers(&quiz_id) {
                log::warn!("failed to drop answer cache on retake: {e}");
            }
        }
        log::info!(
            "started retake attempt {} on quiz {quiz_id}",
            state.attempt_number()
        );
        Ok(state)
    }

    /// Discard the active attempt without submitting. The recovery cache is
    /// kept so the answers survive into the next [`Self::start_attempt`].
    pub fn abandon(&self) {
        if self.active_guard().take().is_some() {
            log::info!("abandoned active attempt");
        }
    }

    // =========================================================================
    // Answering and navigation
    // =========================================================================

    /// Record a selection and mirror the updated answers into the recovery
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no active attempt, the attempt is no
    /// longer in progress, or the question/option id is unknown.
    pub fn select_answer(
        &self,
        question_id: &str,
        option_id: &str,
        checked: bool,
    ) -> Result<AttemptState, QuizSessionError> {
        let mut guard = self.active_guard();
        let active = guard.as_mut().ok_or(QuizSessionError::NoAttempt)?;
        let state = active.state.select_answer(question_id, option_id, checked)?;
        active.state = state.clone();

        if self.cache_enabled {
            // Best effort: a cache write failure never blocks the attempt
            if let Err(e) = self.store.cache_answers(state.quiz_id(), state.answers()) {
                log::warn!("failed to cache answers: {e}");
            }
        }
        Ok(state)
    }

    /// # Errors
    ///
    /// Returns an error if there is no active attempt.
    pub fn go_to(&self, index: usize) -> Result<AttemptState, QuizSessionError> {
        self.navigate(|state| state.go_to(index))
    }

    /// # Errors
    ///
    /// Returns an error if there is no active attempt.
    pub fn next_question(&self) -> Result<AttemptState, QuizSessionError> {
        self.navigate(AttemptState::next_question)
    }

    /// # Errors
    ///
    /// Returns an error if there is no active attempt.
    pub fn previous_question(&self) -> Result<AttemptState, QuizSessionError> {
        self.navigate(AttemptState::previous_question)
    }

    fn navigate(
        &self,
        step: impl FnOnce(&AttemptState) -> AttemptState,
    ) -> Result<AttemptState, QuizSessionError> {
        let mut guard = self.active_guard();
        let active = guard.as_mut().ok_or(QuizSessionError::NoAttempt)?;
        let state = step(&active.state);
        active.state = state.clone();
        Ok(state)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Cloned snapshot of the active attempt, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<AttemptState> {
        self.active_guard().as_ref().map(|a| a.state.clone())
    }

    /// Results view of a quiz, answers and explanations included.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; a 403 means the caller is
    /// neither the creator nor an attempter.
    pub async fn results(&self, quiz_id: &str) -> Result<Quiz, QuizSessionError> {
        Ok(self.api.quiz_for_results(quiz_id).await?)
    }

    /// Page of the caller's attempt history.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn attempt_history(
        &self,
        quiz_id: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QuizAttemptsPage, QuizSessionError> {
        Ok(self.api.list_attempts(quiz_id, limit, offset).await?)
    }

    fn active_guard(&self) -> MutexGuard<'_, Option<ActiveAttempt>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
