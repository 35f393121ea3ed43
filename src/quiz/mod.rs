//! Quiz subsystem: the pure attempt state machine, the async driver that
//! runs it against the server, and the optimistic draft cache for edits.

pub mod attempt;
pub mod optimistic;
pub mod session;

pub use attempt::{AttemptError, AttemptState, SubmissionState};
pub use optimistic::{OptimisticQuiz, OptionPatch, QuestionPatch, QuizPatch};
pub use session::{QuizAttemptSession, QuizSessionError};
