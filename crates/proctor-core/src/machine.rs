//! Assessment state machine.
//!
//! Drives question sequencing and scoring: `Loading → Active → Finished`, or
//! `Loading → Empty` when there is nothing to grade. All transitions are
//! synchronous; the orchestrator owns the clock and feeds ticks and expiries
//! in.

use std::sync::Arc;

use crate::model::{
    Answer, AnswerRecord, AssessmentState, IntegrityIssue, Phase, PresentedQuestion, Question,
};
use crate::traits::AnswerKey;

/// Result of loading the question snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Questions are available; the first one is current.
    Active {
        total: usize,
        issues: Vec<IntegrityIssue>,
    },
    /// The snapshot was empty.
    Empty,
}

/// Result of applying an answer or an expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The question was graded and the next one is current.
    Advanced { correct: bool, next_index: usize },
    /// The last question was graded.
    Finished { correct: bool, final_score: u32 },
    /// Not applicable: wrong phase, or the question was already graded.
    Ignored,
}

/// Question sequencing and scoring for one session.
pub struct AssessmentStateMachine {
    state: AssessmentState,
    timer_duration: u32,
    key: Option<Arc<dyn AnswerKey>>,
    answers: Vec<AnswerRecord>,
    final_score: Option<u32>,
}

impl AssessmentStateMachine {
    /// Create a machine in `Loading`.
    pub fn new(timer_duration: u32) -> Self {
        Self {
            state: AssessmentState {
                questions: Vec::new(),
                current_index: 0,
                score: 0,
                remaining_seconds: timer_duration,
                phase: Phase::Loading,
            },
            timer_duration,
            key: None,
            answers: Vec::new(),
            final_score: None,
        }
    }

    /// Load the snapshot and grade each question by its own `correct_index`.
    ///
    /// # Panics
    ///
    /// If the machine has already left `Loading`.
    pub fn load(&mut self, questions: Vec<Question>) -> LoadOutcome {
        self.load_inner(questions, None)
    }

    /// Load the snapshot and grade against an external answer key.
    ///
    /// # Panics
    ///
    /// If the machine has already left `Loading`.
    pub fn load_with_key(
        &mut self,
        questions: Vec<Question>,
        key: Arc<dyn AnswerKey>,
    ) -> LoadOutcome {
        self.load_inner(questions, Some(key))
    }

    fn load_inner(
        &mut self,
        questions: Vec<Question>,
        key: Option<Arc<dyn AnswerKey>>,
    ) -> LoadOutcome {
        assert_eq!(
            self.state.phase,
            Phase::Loading,
            "question snapshot loaded twice"
        );

        if questions.is_empty() {
            tracing::warn!("question snapshot is empty, assessment cannot run");
            self.state.phase = Phase::Empty;
            return LoadOutcome::Empty;
        }

        let issues = IntegrityIssue::scan(&questions);
        for issue in &issues {
            tracing::warn!("data integrity: {issue}");
        }

        let total = questions.len();
        self.state.questions = questions;
        self.state.remaining_seconds = self.timer_duration;
        self.state.phase = Phase::Active;
        self.key = key;
        tracing::info!(total, "assessment active");

        LoadOutcome::Active { total, issues }
    }

    /// Grade `answer` for the question at `question_index` and advance.
    ///
    /// Only the current question of an active assessment can be answered;
    /// anything else is ignored. This is what makes a manual answer and a
    /// timer expiry for the same question mutually exclusive.
    pub fn answer(&mut self, question_index: usize, answer: Answer) -> Transition {
        if self.state.phase != Phase::Active || question_index != self.state.current_index {
            tracing::debug!(
                question_index,
                current = self.state.current_index,
                phase = %self.state.phase,
                "answer ignored"
            );
            return Transition::Ignored;
        }

        let question = &self.state.questions[question_index];
        let correct = match answer {
            Answer::Selected(selected) => match &self.key {
                Some(key) => key.is_correct(&question.id, selected),
                None => selected == question.correct_index,
            },
            Answer::Timeout => false,
        };

        self.answers.push(AnswerRecord {
            question_id: question.id.clone(),
            answer,
            correct,
        });
        if correct {
            self.state.score += 1;
        }
        self.state.current_index += 1;
        self.state.remaining_seconds = self.timer_duration;

        let transition = if self.state.current_index == self.state.questions.len() {
            self.state.phase = Phase::Finished;
            self.final_score = Some(self.state.score);
            tracing::info!(score = self.state.score, "assessment finished");
            Transition::Finished {
                correct,
                final_score: self.state.score,
            }
        } else {
            Transition::Advanced {
                correct,
                next_index: self.state.current_index,
            }
        };

        self.check_invariants();
        transition
    }

    /// Timer expiry for the question at `question_index`; graded as incorrect.
    pub fn expire(&mut self, question_index: usize) -> Transition {
        self.answer(question_index, Answer::Timeout)
    }

    /// Record the timer's remaining seconds for the current question.
    pub fn tick(&mut self, remaining: u32) {
        if self.state.phase == Phase::Active {
            self.state.remaining_seconds = remaining.min(self.timer_duration);
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn score(&self) -> u32 {
        self.state.score
    }

    /// The score set at the `Finished` transition. `None` until then, and
    /// always `None` for an empty assessment.
    pub fn final_score(&self) -> Option<u32> {
        self.final_score
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.state.remaining_seconds
    }

    pub fn timer_duration(&self) -> u32 {
        self.timer_duration
    }

    pub fn total(&self) -> usize {
        self.state.questions.len()
    }

    /// The question to show now, without its answer key.
    pub fn current_question(&self) -> Option<PresentedQuestion> {
        if self.state.phase != Phase::Active {
            return None;
        }
        self.state
            .questions
            .get(self.state.current_index)
            .map(Question::presented)
    }

    /// Per-question grading history.
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn state(&self) -> &AssessmentState {
        &self.state
    }

    fn check_invariants(&self) {
        let s = &self.state;
        assert!(
            s.current_index <= s.questions.len(),
            "current index {} beyond {} questions",
            s.current_index,
            s.questions.len()
        );
        assert!(
            s.score as usize <= s.current_index,
            "score {} exceeds answered count {}",
            s.score,
            s.current_index
        );
        assert!(s.remaining_seconds <= self.timer_duration);
        assert_eq!(self.answers.len(), s.current_index);
    }
}
