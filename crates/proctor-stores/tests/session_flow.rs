//! End-to-end session tests: orchestrator, state machine, timer, capture and
//! persistence wired to the mock stores and the synthetic device.
//!
//! All tests run on paused time, so question timers expire instantly once
//! the runtime is idle.

use std::sync::Arc;
use std::time::Duration;

use proctor_core::error::{DeviceError, SessionError, StoreError};
use proctor_core::model::{IntegrityIssue, PersistOutcome, Question, RecordingLoss};
use proctor_core::orchestrator::{
    RunningSession, SessionCollaborators, SessionConfig, SessionEvent, SessionOrchestrator,
};
use proctor_stores::mock::{MockArtifactStore, MockFocusLock, MockQuestionBank, MockRecordStore};
use proctor_stores::SyntheticDevice;

const QUESTION_SECS: u32 = 5;

struct Harness {
    bank: Arc<MockQuestionBank>,
    artifacts: Arc<MockArtifactStore>,
    records: Arc<MockRecordStore>,
    lock: Arc<MockFocusLock>,
    device: Arc<SyntheticDevice>,
}

impl Harness {
    fn new(questions: Vec<Question>) -> Self {
        Self {
            bank: Arc::new(MockQuestionBank::new(questions)),
            artifacts: Arc::new(MockArtifactStore::new()),
            records: Arc::new(MockRecordStore::new()),
            lock: Arc::new(MockFocusLock::new()),
            device: Arc::new(SyntheticDevice::new(Duration::from_millis(250), 32)),
        }
    }

    fn with_artifacts(mut self, artifacts: MockArtifactStore) -> Self {
        self.artifacts = Arc::new(artifacts);
        self
    }

    fn with_records(mut self, records: MockRecordStore) -> Self {
        self.records = Arc::new(records);
        self
    }

    fn with_bank(mut self, bank: MockQuestionBank) -> Self {
        self.bank = Arc::new(bank);
        self
    }

    fn with_lock(mut self, lock: MockFocusLock) -> Self {
        self.lock = Arc::new(lock);
        self
    }

    fn with_device(mut self, device: SyntheticDevice) -> Self {
        self.device = Arc::new(device);
        self
    }

    fn collaborators(&self) -> SessionCollaborators {
        SessionCollaborators {
            question_bank: self.bank.clone(),
            artifact_store: self.artifacts.clone(),
            record_store: self.records.clone(),
            capture_device: self.device.clone(),
            focus_lock: Some(self.lock.clone()),
            answer_key: None,
        }
    }

    fn orchestrator(&self) -> SessionOrchestrator {
        let config = SessionConfig {
            question_duration_secs: QUESTION_SECS,
            ..SessionConfig::default()
        };
        SessionOrchestrator::new(self.collaborators(), config)
    }
}

fn question(id: &str, options: usize, correct_index: usize) -> Question {
    Question {
        id: id.into(),
        text: format!("Question {id}"),
        options: (0..options).map(|i| format!("option {i}")).collect(),
        correct_index,
    }
}

/// Options per question [4, 4, 2], correct indexes [1, 0, 1].
fn three_questions() -> Vec<Question> {
    vec![question("q1", 4, 1), question("q2", 4, 0), question("q3", 2, 1)]
}

/// Next event other than a timer tick.
async fn next_event(session: &mut RunningSession) -> SessionEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), session.next_event())
            .await
            .expect("session stalled")
            .expect("event stream closed");
        if !matches!(event, SessionEvent::TimerTick { .. }) {
            return event;
        }
    }
}

async fn expect_presented(session: &mut RunningSession, expected_index: usize) {
    match next_event(session).await {
        SessionEvent::QuestionPresented {
            index,
            remaining_seconds,
            ..
        } => {
            assert_eq!(index, expected_index);
            assert_eq!(remaining_seconds, QUESTION_SECS);
        }
        other => panic!("expected question {expected_index}, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn answered_and_timed_out_questions_score_one() {
    let harness = Harness::new(three_questions());
    let orchestrator = harness.orchestrator();
    let mut session = orchestrator.start("alice").await.unwrap();
    assert!(session.device_error().is_none());

    expect_presented(&mut session, 0).await;
    session.submit_answer(1).unwrap();
    expect_presented(&mut session, 1).await;
    session.submit_answer(2).unwrap();
    expect_presented(&mut session, 2).await;
    // Third question left to time out.

    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Scored {
            final_score: 1,
            total: 3
        }
    );

    let outcome = session.persistence().await.unwrap();
    let PersistOutcome::FullSuccess { record } = outcome else {
        panic!("expected full success, got {outcome:?}");
    };
    assert_eq!(record.score, 1);
    assert_eq!(record.candidate_name, "alice");

    let uploads = harness.artifacts.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(!uploads[0].1.is_empty());
    assert_eq!(
        record.recording_ref.as_deref(),
        Some(format!("mock://{}", uploads[0].0).as_str())
    );
    assert_eq!(harness.records.records(), vec![record]);

    let answers = session.answers();
    assert_eq!(answers.len(), 3);
    assert!(answers[0].correct);
    assert!(!answers[1].correct);
    assert!(!answers[2].correct);

    assert_eq!(harness.device.open_count(), 1);
    assert!(orchestrator.gate().is_free());
    assert!(!harness.lock.is_locked());
}

#[tokio::test(start_paused = true)]
async fn unattended_session_times_out_every_question() {
    let harness = Harness::new(three_questions());
    let mut session = harness.orchestrator().start("bob").await.unwrap();

    let mut ticks = Vec::new();
    let final_score = loop {
        match session.next_event().await.unwrap() {
            SessionEvent::TimerTick { remaining } => ticks.push(remaining),
            SessionEvent::Scored { final_score, .. } => break final_score,
            _ => {}
        }
    };

    assert_eq!(final_score, 0);
    // Each question counts 4, 3, 2, 1, 0.
    assert_eq!(ticks.len(), 3 * QUESTION_SECS as usize);
    assert_eq!(&ticks[..5], &[4, 3, 2, 1, 0]);
    assert_eq!(session.persistence().await.unwrap().record().unwrap().score, 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_ids_are_reported_and_graded_by_position() {
    let harness = Harness::new(vec![question("dup", 3, 0), question("dup", 3, 2)]);
    let mut session = harness.orchestrator().start("erin").await.unwrap();

    assert_eq!(
        session.integrity_issues(),
        &[IntegrityIssue::DuplicateId {
            question_id: "dup".into(),
            first_index: 0,
            index: 1,
        }]
    );

    expect_presented(&mut session, 0).await;
    session.submit_answer(0).unwrap();
    expect_presented(&mut session, 1).await;
    session.submit_answer(2).unwrap();

    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Scored {
            final_score: 2,
            total: 2
        }
    );
}

#[tokio::test(start_paused = true)]
async fn stale_answer_for_graded_question_is_ignored() {
    let harness = Harness::new(vec![question("a", 2, 1), question("b", 2, 0)]);
    let mut session = harness.orchestrator().start("carol").await.unwrap();

    expect_presented(&mut session, 0).await;
    session.submit_answer_for(0, 1).unwrap();
    // Late duplicate for question 0, e.g. a double click racing the advance.
    session.submit_answer_for(0, 1).unwrap();
    expect_presented(&mut session, 1).await;
    session.submit_answer_for(1, 1).unwrap();

    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Scored {
            final_score: 1,
            total: 2
        }
    );
    assert_eq!(session.answers().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn denied_device_runs_unrecorded() {
    let harness = Harness::new(three_questions()).with_device(SyntheticDevice::denied());
    let orchestrator = harness.orchestrator();
    let mut session = orchestrator.start("dave").await.unwrap();

    assert!(matches!(
        session.device_error(),
        Some(DeviceError::PermissionDenied(_))
    ));
    assert!(matches!(
        next_event(&mut session).await,
        SessionEvent::ProctoringUnavailable(DeviceError::PermissionDenied(_))
    ));
    assert!(!session.liveness());

    expect_presented(&mut session, 0).await;
    session.submit_answer(1).unwrap();
    expect_presented(&mut session, 1).await;
    session.submit_answer(0).unwrap();
    expect_presented(&mut session, 2).await;
    session.submit_answer(1).unwrap();

    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Scored {
            final_score: 3,
            total: 3
        }
    );

    match session.persistence().await.unwrap() {
        PersistOutcome::PartialSuccess { record, reason } => {
            assert_eq!(reason, RecordingLoss::NoEvidence);
            assert!(record.recording_ref.is_none());
            assert_eq!(record.score, 3);
        }
        other => panic!("expected partial success, got {other:?}"),
    }
    assert_eq!(harness.artifacts.call_count(), 0);
    assert!(orchestrator.gate().is_free());
}

#[tokio::test(start_paused = true)]
async fn failed_upload_still_saves_record() {
    let harness = Harness::new(three_questions()).with_artifacts(MockArtifactStore::failing());
    let mut session = harness.orchestrator().start("erin").await.unwrap();

    expect_presented(&mut session, 0).await;
    session.submit_answer(1).unwrap();
    expect_presented(&mut session, 1).await;
    session.submit_answer(0).unwrap();
    expect_presented(&mut session, 2).await;
    session.submit_answer(0).unwrap();

    assert!(matches!(
        next_event(&mut session).await,
        SessionEvent::Scored { final_score: 2, .. }
    ));
    let outcome = session.persistence().await.unwrap();
    assert!(matches!(
        outcome,
        PersistOutcome::PartialSuccess {
            reason: RecordingLoss::UploadFailed(_),
            ..
        }
    ));

    assert_eq!(harness.artifacts.call_count(), 1);
    let records = harness.records.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].recording_ref.is_none());
    assert_eq!(records[0].score, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_insert_does_not_change_score() {
    let harness = Harness::new(vec![question("only", 2, 0)]).with_records(MockRecordStore::failing());
    let mut session = harness.orchestrator().start("frank").await.unwrap();

    expect_presented(&mut session, 0).await;
    session.submit_answer(0).unwrap();

    assert_eq!(
        next_event(&mut session).await,
        SessionEvent::Scored {
            final_score: 1,
            total: 1
        }
    );
    assert!(matches!(
        session.persistence().await.unwrap(),
        PersistOutcome::Failure { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn empty_question_set_never_starts() {
    let harness = Harness::new(vec![]);
    let orchestrator = harness.orchestrator();

    let result = orchestrator.start("gina").await;

    assert!(matches!(result, Err(SessionError::EmptyQuestionSet)));
    assert!(orchestrator.gate().is_free());
    assert!(!harness.lock.is_locked());
    assert_eq!(harness.records.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_focus_lock_blocks_start() {
    let harness = Harness::new(three_questions());
    let mut collaborators = harness.collaborators();
    collaborators.focus_lock = None;
    let orchestrator = SessionOrchestrator::new(collaborators, SessionConfig::default());

    let result = orchestrator.start("hank").await;

    assert!(matches!(result, Err(SessionError::LockdownUnavailable)));
    assert_eq!(harness.bank.call_count(), 0);
    assert_eq!(harness.device.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn refused_lockdown_blocks_start() {
    let harness = Harness::new(three_questions()).with_lock(MockFocusLock::refusing());
    let result = harness.orchestrator().start("ivy").await;
    assert!(matches!(result, Err(SessionError::Lockdown(_))));
    assert_eq!(harness.device.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn question_bank_failure_unwinds() {
    let harness = Harness::new(vec![]).with_bank(MockQuestionBank::failing(
        StoreError::Unavailable("offline".into()),
    ));
    let orchestrator = harness.orchestrator();

    let result = orchestrator.start("jack").await;

    assert!(matches!(result, Err(SessionError::QuestionBank(_))));
    assert!(orchestrator.gate().is_free());
    assert!(!harness.lock.is_locked());
}

#[tokio::test(start_paused = true)]
async fn abort_releases_everything_and_persists_nothing() {
    let harness = Harness::new(three_questions());
    let orchestrator = harness.orchestrator();
    let mut session = orchestrator.start("kim").await.unwrap();

    expect_presented(&mut session, 0).await;
    session.submit_answer(1).unwrap();
    expect_presented(&mut session, 1).await;
    session.abort().unwrap();

    assert_eq!(next_event(&mut session).await, SessionEvent::Aborted);
    assert!(session.persistence().await.is_none());
    assert!(session.next_event().await.is_none());
    assert!(matches!(
        session.submit_answer(0),
        Err(SessionError::SessionClosed)
    ));

    assert_eq!(harness.artifacts.call_count(), 0);
    assert_eq!(harness.records.call_count(), 0);
    assert!(orchestrator.gate().is_free());
    assert!(!harness.lock.is_locked());
}

#[tokio::test(start_paused = true)]
async fn liveness_reported_while_capturing() {
    let harness = Harness::new(three_questions());
    let mut session = harness.orchestrator().start("lee").await.unwrap();

    expect_presented(&mut session, 0).await;
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(session.liveness());

    session.abort().unwrap();
    assert_eq!(next_event(&mut session).await, SessionEvent::Aborted);
    assert!(!session.liveness());
}

#[tokio::test(start_paused = true)]
async fn sessions_share_the_device_one_at_a_time() {
    let harness = Harness::new(vec![question("only", 2, 0)]);
    let orchestrator = harness.orchestrator();

    let mut first = orchestrator.start("first").await.unwrap();
    assert!(!orchestrator.gate().is_free());
    expect_presented(&mut first, 0).await;
    first.submit_answer(0).unwrap();
    assert!(matches!(next_event(&mut first).await, SessionEvent::Scored { .. }));
    first.persistence().await.unwrap();

    let mut second = orchestrator.start("second").await.unwrap();
    expect_presented(&mut second, 0).await;
    second.abort().unwrap();
    assert_eq!(next_event(&mut second).await, SessionEvent::Aborted);

    assert_eq!(harness.device.open_count(), 2);
    assert_eq!(harness.records.records().len(), 1);
}
