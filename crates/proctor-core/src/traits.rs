//! Collaborator traits consumed by the session engine.
//!
//! Authentication, the question bank, artifact/record storage, the kiosk
//! focus lock and the capture hardware all live outside the engine. The
//! `proctor-stores` crate provides implementations.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::{DeviceError, StoreError};
use crate::model::{Question, Role, SessionRecord};

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Credential verification and role resolution.
#[async_trait]
pub trait AuthCollaborator: Send + Sync {
    /// Returns the user's role, or `None` if the credentials match nobody.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Role>, StoreError>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Source of assessment questions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// All questions in creation order. That order is the presentation order.
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError>;
}

/// Durable storage for recording artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `name` and return a URL or handle referencing it.
    async fn upload(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<String, StoreError>;
}

/// Durable storage for session records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new session record.
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Most recent records, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// Kiosk shell
// ---------------------------------------------------------------------------

/// The window-lockdown shell hosting the assessment.
#[async_trait]
pub trait FocusLock: Send + Sync {
    async fn enter_lockdown(&self) -> anyhow::Result<()>;
    async fn exit_lockdown(&self) -> anyhow::Result<()>;
    async fn quit(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Capture hardware
// ---------------------------------------------------------------------------

/// Stop control for an opened capture device.
#[async_trait]
pub trait DeviceControl: Send {
    /// Stop capturing and release the OS handle.
    ///
    /// After this returns the device must close its chunk sender so the
    /// consumer observes end-of-stream. Calling it twice is harmless.
    async fn stop(&mut self) -> Result<(), DeviceError>;
}

/// Live feed from an opened camera/microphone.
pub struct CaptureFeed {
    /// Encoded media chunks in capture order.
    pub chunks: mpsc::Receiver<Vec<u8>>,
    /// Latest instantaneous audio amplitude (0–255 byte scale).
    pub audio_level: watch::Receiver<f32>,
    /// Handle used to stop the device.
    pub control: Box<dyn DeviceControl>,
}

/// Camera/microphone hardware.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Open the device. Fails with [`DeviceError`] if access is denied or no device exists.
    async fn open(&self) -> Result<CaptureFeed, DeviceError>;
}

// ---------------------------------------------------------------------------
// Answer key
// ---------------------------------------------------------------------------

/// Grading oracle: is `selected` the correct option for `question_id`?
pub trait AnswerKey: Send + Sync {
    fn is_correct(&self, question_id: &str, selected: usize) -> bool;
}
