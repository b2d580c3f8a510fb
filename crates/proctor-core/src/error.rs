//! Error types shared by the session engine and its collaborators.
//!
//! Defined in `proctor-core` so the orchestrator can classify failures
//! (device vs. store vs. session setup) without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while acquiring or driving the camera/microphone.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DeviceError {
    /// The user or OS refused camera/microphone access.
    #[error("camera/microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device exists.
    #[error("no capture device found: {0}")]
    NotFound(String),

    /// The device gate was closed while waiting for the previous session to release it.
    #[error("capture device is held by another session")]
    Busy,

    /// The device failed after it was opened.
    #[error("capture device failed: {0}")]
    Failed(String),
}

/// Errors reported by the artifact store, record store, question bank or auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error status.
    #[error("store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Reasons a session could not be started or driven.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No focus-lock collaborator is available; the assessment must not run unlocked.
    #[error("assessment cannot start outside the controlled shell (no focus lock available)")]
    LockdownUnavailable,

    /// The focus-lock collaborator refused to enter lockdown.
    #[error("failed to enter lockdown: {0}")]
    Lockdown(String),

    /// The question bank could not be read.
    #[error("failed to load questions: {0}")]
    QuestionBank(#[source] StoreError),

    /// The question bank returned no questions; there is nothing to grade.
    #[error("no questions available for this assessment")]
    EmptyQuestionSet,

    /// The session actor has already stopped.
    #[error("session is closed")]
    SessionClosed,
}

/// Validation failures for a candidate profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("full name must not be blank")]
    BlankName,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("bio is too long ({len} chars, max {max})")]
    BioTooLong { len: usize, max: usize },
}
