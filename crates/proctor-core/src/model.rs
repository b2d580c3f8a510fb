//! Core data model types for proctor.
//!
//! These are the types the session engine and its collaborators exchange:
//! questions, the assessment state, recording artifacts and persisted
//! session records.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// A multiple-choice question as held by the question bank.
///
/// `correct_index` is the answer key. It never leaves the engine: UI events
/// carry [`PresentedQuestion`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within the bank.
    pub id: String,
    /// Question text shown to the candidate.
    pub text: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    #[serde(alias = "answer_index")]
    pub correct_index: usize,
}

impl Question {
    /// The candidate-visible form of this question.
    pub fn presented(&self) -> PresentedQuestion {
        PresentedQuestion {
            id: self.id.clone(),
            text: self.text.clone(),
            options: self.options.clone(),
        }
    }

    /// Data-integrity problems with this question, if any.
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        if self.options.len() < 2 {
            issues.push(IntegrityIssue::TooFewOptions {
                question_id: self.id.clone(),
                count: self.options.len(),
            });
        }
        if self.correct_index >= self.options.len() {
            issues.push(IntegrityIssue::CorrectIndexOutOfRange {
                question_id: self.id.clone(),
                correct_index: self.correct_index,
                option_count: self.options.len(),
            });
        }
        issues
    }
}

/// A named collection of questions, as authored in a question-bank file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Questions in presentation order.
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Best score a candidate can reach. Questions whose correct index is
    /// out of range can never be answered correctly.
    pub fn attainable_score(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| q.correct_index < q.options.len())
            .count()
    }
}

/// A question stripped of its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

/// A malformed question detected when the snapshot is loaded.
///
/// The question is still presented; this is surfaced for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    TooFewOptions {
        question_id: String,
        count: usize,
    },
    CorrectIndexOutOfRange {
        question_id: String,
        correct_index: usize,
        option_count: usize,
    },
    /// Two questions share an id. Each is still graded by its own position.
    DuplicateId {
        question_id: String,
        first_index: usize,
        index: usize,
    },
}

impl IntegrityIssue {
    /// Every issue in a snapshot, in question order.
    pub fn scan(questions: &[Question]) -> Vec<IntegrityIssue> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut issues = Vec::new();
        for (index, question) in questions.iter().enumerate() {
            issues.extend(question.integrity_issues());
            match seen.get(question.id.as_str()) {
                Some(&first_index) => issues.push(IntegrityIssue::DuplicateId {
                    question_id: question.id.clone(),
                    first_index,
                    index,
                }),
                None => {
                    seen.insert(&question.id, index);
                }
            }
        }
        issues
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::TooFewOptions { question_id, count } => {
                write!(f, "question {question_id} has {count} option(s), expected at least 2")
            }
            IntegrityIssue::CorrectIndexOutOfRange {
                question_id,
                correct_index,
                option_count,
            } => write!(
                f,
                "question {question_id} has correct index {correct_index} but only {option_count} option(s)"
            ),
            IntegrityIssue::DuplicateId {
                question_id,
                first_index,
                index,
            } => write!(
                f,
                "question {question_id} at position {} reuses the id of position {}",
                index + 1,
                first_index + 1
            ),
        }
    }
}

/// A candidate's response to one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    /// The candidate picked the option at this index.
    Selected(usize),
    /// The question timer ran out. Always graded incorrect.
    Timeout,
}

/// Phase of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for the question snapshot.
    Loading,
    /// Presenting questions.
    Active,
    /// Every question has been answered or timed out.
    Finished,
    /// The snapshot was empty; nothing to grade.
    Empty,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Loading => write!(f, "loading"),
            Phase::Active => write!(f, "active"),
            Phase::Finished => write!(f, "finished"),
            Phase::Empty => write!(f, "empty"),
        }
    }
}

/// Mutable state of one assessment, owned by the state machine.
#[derive(Debug, Clone)]
pub struct AssessmentState {
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub score: u32,
    pub remaining_seconds: u32,
    pub phase: Phase,
}

/// Outcome of grading one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: Answer,
    pub correct: bool,
}

/// The finalized recording produced by a capture session.
///
/// Cloning is cheap; clones share the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Concatenated encoded media.
    pub data: Arc<[u8]>,
    /// Number of chunks the buffer held when it was frozen.
    pub chunk_count: usize,
    /// MIME type of the container (e.g. "video/webm").
    pub mime_type: String,
    /// File extension used when naming the upload (e.g. "webm").
    pub extension: String,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Status of a persisted session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
}

/// The durable record of one finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub candidate_name: String,
    pub score: u32,
    /// Public URL or handle of the uploaded recording, if the upload succeeded.
    #[serde(rename = "recording_url", default)]
    pub recording_ref: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Why a session record was saved without its recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordingLoss {
    /// No capture device was available, so there was nothing to upload.
    NoEvidence,
    /// The artifact upload failed.
    UploadFailed(String),
}

impl fmt::Display for RecordingLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingLoss::NoEvidence => write!(f, "no recording was captured"),
            RecordingLoss::UploadFailed(e) => write!(f, "recording upload failed: {e}"),
        }
    }
}

/// How completely the proctoring evidence of a session survived.
///
/// All variants are normal completions: the score was computed before
/// persistence started and is never affected by it.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    /// Recording uploaded and session record inserted.
    FullSuccess { record: SessionRecord },
    /// Session record inserted without a recording.
    PartialSuccess {
        record: SessionRecord,
        reason: RecordingLoss,
    },
    /// The session record could not be inserted.
    Failure { reason: String },
}

impl PersistOutcome {
    /// The record that was stored, if any.
    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            PersistOutcome::FullSuccess { record } | PersistOutcome::PartialSuccess { record, .. } => {
                Some(record)
            }
            PersistOutcome::Failure { .. } => None,
        }
    }

    pub fn is_full_success(&self) -> bool {
        matches!(self, PersistOutcome::FullSuccess { .. })
    }
}

/// Role resolved by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    #[serde(alias = "sub_admin")]
    Operator,
    #[serde(alias = "super_admin")]
    SuperOperator,
}

impl Role {
    /// Only candidates sit assessments.
    pub fn may_take_assessment(self) -> bool {
        self == Role::Candidate
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Candidate => write!(f, "candidate"),
            Role::Operator => write!(f, "operator"),
            Role::SuperOperator => write!(f, "super_operator"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "candidate" => Ok(Role::Candidate),
            "operator" | "sub_admin" => Ok(Role::Operator),
            "super_operator" | "super_admin" => Ok(Role::SuperOperator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

const MAX_BIO_CHARS: usize = 2000;

/// Candidate profile with named optional fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl CandidateProfile {
    /// Validate the profile at the boundary where it enters the system.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if let Some(name) = &self.full_name {
            if name.trim().is_empty() {
                return Err(ProfileError::BlankName);
            }
        }

        if let Some(email) = &self.email {
            let valid = match email.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !domain.contains('@')
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                }
                None => false,
            };
            if !valid {
                return Err(ProfileError::InvalidEmail(email.clone()));
            }
        }

        if let Some(phone) = &self.phone {
            let allowed = |c: char| c.is_ascii_digit() || " +-()".contains(c);
            if phone.trim().is_empty() || !phone.chars().all(allowed) {
                return Err(ProfileError::InvalidPhone(phone.clone()));
            }
        }

        if let Some(bio) = &self.bio {
            let len = bio.chars().count();
            if len > MAX_BIO_CHARS {
                return Err(ProfileError::BioTooLong {
                    len,
                    max: MAX_BIO_CHARS,
                });
            }
        }

        Ok(())
    }

    /// Name to record for a session: the full name if set, else the username.
    pub fn display_name(&self, username: &str) -> String {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(username)
            .to_string()
    }
}
