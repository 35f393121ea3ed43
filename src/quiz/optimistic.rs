//! Optimistic draft cache for quiz edits
//!
//! Models a quiz being edited as a three-way merge: the last
//! server-confirmed base, an in-flight patch applied optimistically on top,
//! and rollback to the base if the server rejects it. The merged view is what
//! a consumer renders while the mutation is outstanding; the server's
//! response is always the next base.

use crate::models::{Quiz, QuizQuestion, QuestionOption, QuestionType, QuizStatus};

/// Field-level update to a quiz. Unset fields leave the base value alone;
/// nested questions and options are merged by id, with unknown ids appended.
#[derive(Debug, Clone, Default)]
pub struct QuizPatch {
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub required_score: Option<u32>,
    pub attempt_limit: Option<u32>,
    pub topic: Option<String>,
    pub status: Option<QuizStatus>,
    pub questions: Vec<QuestionPatch>,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionPatch {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub question_type: Option<QuestionType>,
    pub order: Option<u32>,
    pub topic: Option<String>,
    pub options: Vec<OptionPatch>,
}

#[derive(Debug, Clone, Default)]
pub struct OptionPatch {
    pub id: String,
    pub text: Option<String>,
    pub correct: Option<bool>,
    pub explanation: Option<String>,
}

impl QuizPatch {
    /// Combine two patches into one, `later` winning field-wise.
    #[must_use]
    pub fn merge(mut self, later: Self) -> Self {
        self.name = later.name.or(self.name);
        self.title = later.title.or(self.title);
        self.description = later.description.or(self.description);
        self.required_score = later.required_score.or(self.required_score);
        self.attempt_limit = later.attempt_limit.or(self.attempt_limit);
        self.topic = later.topic.or(self.topic);
        self.status = later.status.or(self.status);

        for question in later.questions {
            match self.questions.iter_mut().find(|q| q.id == question.id) {
                Some(existing) => existing.absorb(question),
                None => self.questions.push(question),
            }
        }
        self
    }
}

impl QuestionPatch {
    fn absorb(&mut self, later: Self) {
        self.title = later.title.or(self.title.take());
        self.description = later.description.or(self.description.take());
        self.question_type = later.question_type.or(self.question_type.take());
        self.order = later.order.or(self.order.take());
        self.topic = later.topic.or(self.topic.take());
        for option in later.options {
            match self.options.iter_mut().find(|o| o.id == option.id) {
                Some(existing) => existing.absorb(option),
                None => self.options.push(option),
            }
        }
    }

    fn apply_to(&self, question: &mut QuizQuestion) {
        if let Some(title) = &self.title {
            question.title = title.clone();
        }
        if let Some(description) = &self.description {
            question.description = description.clone();
        }
        if let Some(question_type) = self.question_type {
            question.question_type = question_type;
        }
        if let Some(order) = self.order {
            question.order = order;
        }
        if let Some(topic) = &self.topic {
            question.topic = topic.clone();
        }
        for patch in &self.options {
            match question.options.iter_mut().find(|o| o.id == patch.id) {
                Some(option) => patch.apply_to(option),
                None => question.options.push(patch.materialize()),
            }
        }
        question.option_count = u32::try_from(question.options.len()).unwrap_or(0);
    }

    fn materialize(&self) -> QuizQuestion {
        let mut question = QuizQuestion {
            id: self.id.clone(),
            title: String::new(),
            description: String::new(),
            question_type: self.question_type.unwrap_or(QuestionType::Single),
            options: Vec::new(),
            option_count: 0,
            order: 0,
            topic: String::new(),
        };
        self.apply_to(&mut question);
        question
    }
}

impl OptionPatch {
    fn absorb(&mut self, later: Self) {
        self.text = later.text.or(self.text.take());
        self.correct = later.correct.or(self.correct.take());
        self.explanation = later.explanation.or(self.explanation.take());
    }

    fn apply_to(&self, option: &mut QuestionOption) {
        if let Some(text) = &self.text {
            option.text = text.clone();
        }
        if let Some(correct) = self.correct {
            option.correct = Some(correct);
        }
        if let Some(explanation) = &self.explanation {
            option.explanation = Some(explanation.clone());
        }
    }

    fn materialize(&self) -> QuestionOption {
        QuestionOption {
            id: self.id.clone(),
            text: self.text.clone().unwrap_or_default(),
            correct: self.correct,
            explanation: self.explanation.clone(),
        }
    }
}

// =============================================================================
// Three-way state
// =============================================================================

/// Quiz under edit: server-confirmed base plus an optional pending patch.
#[derive(Debug, Clone)]
pub struct OptimisticQuiz {
    committed: Quiz,
    pending: Option<QuizPatch>,
}

impl OptimisticQuiz {
    #[must_use]
    pub fn new(committed: Quiz) -> Self {
        Self {
            committed,
            pending: None,
        }
    }

    /// The last server-confirmed quiz.
    #[must_use]
    pub fn committed(&self) -> &Quiz {
        &self.committed
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// What a consumer should render: the base with the pending patch, if
    /// any, applied on top.
    #[must_use]
    pub fn view(&self) -> Quiz {
        let mut quiz = self.committed.clone();
        if let Some(patch) = &self.pending {
            apply_patch(&mut quiz, patch);
        }
        quiz
    }

    /// Stack a patch optimistically. A patch applied while one is already
    /// pending folds into it, the newer fields winning.
    pub fn apply(&mut self, patch: QuizPatch) {
        self.pending = Some(match self.pending.take() {
            Some(pending) => pending.merge(patch),
            None => patch,
        });
    }

    /// The server confirmed the mutation: its quiz becomes the new base and
    /// the pending patch is dropped.
    pub fn commit(&mut self, server_quiz: Quiz) {
        self.committed = server_quiz;
        self.pending = None;
    }

    /// The server rejected the mutation: drop the pending patch, leaving the
    /// confirmed base as the view.
    pub fn rollback(&mut self) {
        self.pending = None;
    }
}

fn apply_patch(quiz: &mut Quiz, patch: &QuizPatch) {
    if let Some(name) = &patch.name {
        quiz.name = name.clone();
    }
    if let Some(title) = &patch.title {
        quiz.title = Some(title.clone());
    }
    if let Some(description) = &patch.description {
        quiz.description = Some(description.clone());
    }
    if let Some(required_score) = patch.required_score {
        quiz.required_score = required_score;
    }
    if let Some(attempt_limit) = patch.attempt_limit {
        quiz.attempt_limit = attempt_limit;
    }
    if let Some(topic) = &patch.topic {
        quiz.topic = Some(topic.clone());
    }
    if let Some(status) = patch.status {
        quiz.status = status;
    }
    for question_patch in &patch.questions {
        match quiz
            .questions
            .iter_mut()
            .find(|q| q.id == question_patch.id)
        {
            Some(question) => question_patch.apply_to(question),
            None => quiz.questions.push(question_patch.materialize()),
        }
    }
    quiz.question_count = u32::try_from(quiz.questions.len()).unwrap_or(0);
}
