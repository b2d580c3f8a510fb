//! Mock collaborators for testing sessions without real backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use proctor_core::error::StoreError;
use proctor_core::model::{Question, SessionRecord};
use proctor_core::traits::{ArtifactStore, FocusLock, QuestionBank, RecordStore};

/// A question bank serving a fixed snapshot, or always failing.
pub struct MockQuestionBank {
    questions: Vec<Question>,
    error: Option<StoreError>,
    call_count: AtomicU32,
}

impl MockQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            error: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// A bank whose every read fails with `error`.
    pub fn failing(error: StoreError) -> Self {
        Self {
            questions: Vec::new(),
            error: Some(error),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QuestionBank for MockQuestionBank {
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.questions.clone()),
        }
    }
}

/// An artifact store that keeps uploads in memory.
#[derive(Default)]
pub struct MockArtifactStore {
    fail: bool,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    call_count: AtomicU32,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every upload fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Successful uploads as `(name, bytes)`.
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn upload(&self, name: &str, bytes: &[u8], _mime_type: &str) -> Result<String, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(StoreError::Unavailable("mock upload failure".into()));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.to_vec()));
        Ok(format!("mock://{name}"))
    }
}

/// A record store that keeps records in memory.
#[derive(Default)]
pub struct MockRecordStore {
    fail: bool,
    records: Mutex<Vec<SessionRecord>>,
    call_count: AtomicU32,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every insert fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(StoreError::Rejected {
                status: 500,
                message: "mock insert failure".into(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let mut records = self.records();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

/// A focus lock that counts lockdown transitions.
#[derive(Default)]
pub struct MockFocusLock {
    refuse: bool,
    enters: AtomicU32,
    exits: AtomicU32,
    quits: AtomicU32,
}

impl MockFocusLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lock that refuses to enter lockdown.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn enter_count(&self) -> u32 {
        self.enters.load(Ordering::Relaxed)
    }

    pub fn exit_count(&self) -> u32 {
        self.exits.load(Ordering::Relaxed)
    }

    pub fn quit_count(&self) -> u32 {
        self.quits.load(Ordering::Relaxed)
    }

    /// Whether the shell is currently locked down.
    pub fn is_locked(&self) -> bool {
        self.enter_count() > self.exit_count()
    }
}

#[async_trait]
impl FocusLock for MockFocusLock {
    async fn enter_lockdown(&self) -> anyhow::Result<()> {
        if self.refuse {
            anyhow::bail!("mock shell refused lockdown");
        }
        self.enters.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn exit_lockdown(&self) -> anyhow::Result<()> {
        self.exits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn quit(&self) -> anyhow::Result<()> {
        self.quits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
