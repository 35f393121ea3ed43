//! Quiz attempt state machine
//!
//! Pure transition functions over an immutable [`AttemptState`]: every
//! operation returns a new state (or an error) and never performs I/O, so the
//! whole machine is testable without a network or rendering environment. The
//! async driver in [`super::session`] owns one of these and applies the
//! transitions around its network calls.
//!
//! Invariants held by every reachable state:
//! - `current_index` stays within the question list
//! - `answers` only contains keys present in `ordered_questions`
//! - Single/Bool questions carry at most one selected option
//! - once submitted, answers are immutable

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::models::{
    QuestionAnswerSubmission, QuestionForTaking, QuizAttemptResponse, QuizForTaking,
    SubmitQuizAttemptPayload,
};
use crate::storage::AnswerMap;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("quiz has no questions")]
    EmptyQuiz,
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
    #[error("unknown option {option} for question {question}")]
    UnknownOption { question: String, option: String },
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("attempt has already been submitted")]
    AlreadySubmitted,
    #[error("attempt has not been submitted")]
    NotSubmitted,
    #[error("attempt limit reached ({attempts} of {limit})")]
    AttemptLimitReached { attempts: u32, limit: u32 },
}

/// Submission lifecycle of one attempt.
#[derive(Debug, Clone)]
pub enum SubmissionState {
    InProgress,
    Submitting,
    Submitted(QuizAttemptResponse),
}

/// One in-progress pass through a quiz's questions.
#[derive(Debug, Clone)]
pub struct AttemptState {
    quiz_id: String,
    ordered_questions: Vec<QuestionForTaking>,
    answers: AnswerMap,
    current_index: usize,
    attempt_number: u32,
    submission: SubmissionState,
}

impl AttemptState {
    /// Begin an attempt over the server-provided question set.
    ///
    /// The first attempt preserves server order exactly; repeat attempts get
    /// a fresh Fisher-Yates permutation of the same questions.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptError::EmptyQuiz`] if the quiz carries no questions.
    pub fn start(quiz: &QuizForTaking, attempt_number: u32) -> Result<Self, AttemptError> {
        if quiz.questions.is_empty() {
            return Err(AttemptError::EmptyQuiz);
        }

        let mut ordered_questions = quiz.questions.clone();
        if attempt_number > 1 {
            ordered_questions.shuffle(&mut rand::rng());
        }

        Ok(Self {
            quiz_id: quiz.id.clone(),
            ordered_questions,
            answers: AnswerMap::new(),
            current_index: 0,
            attempt_number,
            submission: SubmissionState::InProgress,
        })
    }

    // =========================================================================
    // Answer selection
    // =========================================================================

    /// Record a selection for any question, not just the current one (free
    /// navigation keeps the answer map independent of the pointer).
    ///
    /// Single/Bool questions replace their selection with `option_id`
    /// regardless of `checked`; Multi questions add or remove it.
    ///
    /// # Errors
    ///
    /// Rejected without state change when the attempt is no longer in
    /// progress or the question/option id is unknown.
    pub fn select_answer(
        &self,
        question_id: &str,
        option_id: &str,
        checked: bool,
    ) -> Result<Self, AttemptError> {
        self.require_in_progress()?;

        let question = self
            .ordered_questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AttemptError::UnknownQuestion(question_id.to_string()))?;

        if !question.options.iter().any(|o| o.id == option_id) {
            return Err(AttemptError::UnknownOption {
                question: question_id.to_string(),
                option: option_id.to_string(),
            });
        }

        let mut next = self.clone();
        let selection = next.answers.entry(question_id.to_string()).or_default();

        if question.question_type.is_single_select() {
            selection.clear();
            selection.insert(option_id.to_string());
        } else if checked {
            selection.insert(option_id.to_string());
        } else {
            selection.remove(option_id);
        }

        if selection.is_empty() {
            next.answers.remove(question_id);
        }
        Ok(next)
    }

    /// Replace the answer map wholesale, e.g. from the recovery cache.
    /// Entries for unknown questions or options are dropped; only an
    /// untouched in-progress attempt accepts a restore.
    #[must_use]
    pub fn restore_answers(&self, cached: AnswerMap) -> Self {
        if !matches!(self.submission, SubmissionState::InProgress) || !self.answers.is_empty() {
            return self.clone();
        }

        let mut next = self.clone();
        for (question_id, options) in cached {
            let Some(question) = self.ordered_questions.iter().find(|q| q.id == question_id)
            else {
                continue;
            };
            let valid: BTreeSet<String> = options
                .into_iter()
                .filter(|id| question.options.iter().any(|o| &o.id == id))
                .collect();
            if !valid.is_empty() {
                next.answers.insert(question_id, valid);
            }
        }
        next
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Move the question pointer; out-of-range targets are no-ops.
    #[must_use]
    pub fn go_to(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index < self.ordered_questions.len() {
            next.current_index = index;
        }
        next
    }

    #[must_use]
    pub fn next_question(&self) -> Self {
        self.go_to(self.current_index + 1)
    }

    #[must_use]
    pub fn previous_question(&self) -> Self {
        if self.current_index == 0 {
            self.clone()
        } else {
            self.go_to(self.current_index - 1)
        }
    }

    // =========================================================================
    // Submission lifecycle
    // =========================================================================

    /// # Errors
    ///
    /// Rejected when the attempt is not in progress (a second concurrent
    /// submit lands here and is refused).
    pub fn begin_submit(&self) -> Result<Self, AttemptError> {
        self.require_in_progress()?;
        let mut next = self.clone();
        next.submission = SubmissionState::Submitting;
        Ok(next)
    }

    /// # Errors
    ///
    /// Rejected unless a submission is in flight.
    pub fn complete_submit(&self, result: QuizAttemptResponse) -> Result<Self, AttemptError> {
        if !matches!(self.submission, SubmissionState::Submitting) {
            return Err(AttemptError::NotSubmitted);
        }
        let mut next = self.clone();
        next.submission = SubmissionState::Submitted(result);
        Ok(next)
    }

    /// Roll a failed submission back to in-progress; answers are preserved
    /// so the user can retry without data loss.
    ///
    /// # Errors
    ///
    /// Rejected unless a submission is in flight.
    pub fn fail_submit(&self) -> Result<Self, AttemptError> {
        if !matches!(self.submission, SubmissionState::Submitting) {
            return Err(AttemptError::NotSubmitted);
        }
        let mut next = self.clone();
        next.submission = SubmissionState::InProgress;
        Ok(next)
    }

    /// Start a fresh attempt over the same quiz.
    ///
    /// # Errors
    ///
    /// Rejected unless the current attempt was submitted and the
    /// server-reported attempt number is below the quiz's limit.
    pub fn retake(&self, quiz: &QuizForTaking) -> Result<Self, AttemptError> {
        let SubmissionState::Submitted(result) = &self.submission else {
            return Err(AttemptError::NotSubmitted);
        };
        if result.attempt_number >= quiz.attempt_limit {
            return Err(AttemptError::AttemptLimitReached {
                attempts: result.attempt_number,
                limit: quiz.attempt_limit,
            });
        }
        Self::start(quiz, result.attempt_number + 1)
    }

    /// Complete answer list for grading: one entry per ordered question,
    /// unanswered questions submitting an empty selection set.
    #[must_use]
    pub fn submission_payload(&self) -> SubmitQuizAttemptPayload {
        let answers = self
            .ordered_questions
            .iter()
            .map(|question| QuestionAnswerSubmission {
                question_id: question.id.clone(),
                selected_option_ids: self
                    .answers
                    .get(&question.id)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();

        SubmitQuizAttemptPayload {
            quiz_id: self.quiz_id.clone(),
            answers,
        }
    }

    // =========================================================================
    // Snapshots and derived values
    // =========================================================================

    #[must_use]
    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionForTaking] {
        &self.ordered_questions
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> &QuestionForTaking {
        &self.ordered_questions[self.current_index]
    }

    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    #[must_use]
    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    #[must_use]
    pub fn graded_result(&self) -> Option<&QuizAttemptResponse> {
        match &self.submission {
            SubmissionState::Submitted(result) => Some(result),
            _ => None,
        }
    }

    /// Number of questions with a non-empty selection set.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|set| !set.is_empty()).count()
    }

    /// Position indicator, `(current_index + 1) / total`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_fraction(&self) -> f64 {
        (self.current_index + 1) as f64 / self.ordered_questions.len() as f64
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.ordered_questions.len()
    }

    fn require_in_progress(&self) -> Result<(), AttemptError> {
        match self.submission {
            SubmissionState::InProgress => Ok(()),
            SubmissionState::Submitting => Err(AttemptError::SubmissionInFlight),
            SubmissionState::Submitted(_) => Err(AttemptError::AlreadySubmitted),
        }
    }
}
