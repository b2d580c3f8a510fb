//! Session orchestration.
//!
//! [`SessionOrchestrator::start`] enters lockdown, acquires capture and loads
//! the question snapshot, then hands everything to a session actor. The actor
//! is the only place the state machine, the timer and the capture session
//! are touched: answers, aborts and timer signals all arrive on channels and
//! are handled one at a time in a single `select!` loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::capture::{CaptureConfig, DeviceGate, MediaCaptureSession};
use crate::error::{DeviceError, SessionError};
use crate::machine::{AssessmentStateMachine, LoadOutcome, Transition};
use crate::model::{Answer, AnswerRecord, IntegrityIssue, PersistOutcome, PresentedQuestion};
use crate::pipeline::{PipelineConfig, RecordingPipeline};
use crate::timer::QuestionTimer;
use crate::traits::{AnswerKey, ArtifactStore, CaptureDevice, FocusLock, QuestionBank, RecordStore};

/// External collaborators a session needs.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub question_bank: Arc<dyn QuestionBank>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub record_store: Arc<dyn RecordStore>,
    pub capture_device: Arc<dyn CaptureDevice>,
    /// Without a focus lock no assessment can start.
    pub focus_lock: Option<Arc<dyn FocusLock>>,
    /// Grade against this key instead of one built from the snapshot.
    pub answer_key: Option<Arc<dyn AnswerKey>>,
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seconds allowed per question.
    pub question_duration_secs: u32,
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            question_duration_secs: 60,
            capture: CaptureConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Events for the presentation layer.
///
/// Questions are sent as [`PresentedQuestion`]; nothing here reveals the
/// answer key or whether an answer was correct.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Capture could not be started. The assessment continues unrecorded.
    ProctoringUnavailable(DeviceError),
    QuestionPresented {
        question: PresentedQuestion,
        index: usize,
        total: usize,
        remaining_seconds: u32,
    },
    TimerTick { remaining: u32 },
    /// The assessment is over. Always sent before persistence starts.
    Scored { final_score: u32, total: usize },
    Aborted,
}

#[derive(Debug)]
enum Command {
    Answer {
        question_index: usize,
        selected: usize,
    },
    Abort,
}

#[derive(Debug)]
enum TimerSignal {
    Tick { question_index: usize, remaining: u32 },
    Expired { question_index: usize },
}

#[derive(Debug, Clone)]
enum PersistState {
    Pending,
    Done(PersistOutcome),
    Skipped,
}

/// Cloneable handle for sending candidate input to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    presented: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Answer the question most recently presented.
    pub fn submit_answer(&self, selected: usize) -> Result<(), SessionError> {
        let question_index = self.presented.load(Ordering::SeqCst);
        self.submit_answer_for(question_index, selected)
    }

    /// Answer the question at `question_index`. Ignored unless it is still current.
    pub fn submit_answer_for(&self, question_index: usize, selected: usize) -> Result<(), SessionError> {
        self.commands
            .send(Command::Answer {
                question_index,
                selected,
            })
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Abandon the session. Nothing is persisted.
    pub fn abort(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Abort)
            .map_err(|_| SessionError::SessionClosed)
    }
}

/// A started session.
pub struct RunningSession {
    session_id: Uuid,
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    device_error: Option<DeviceError>,
    liveness: Option<Arc<AtomicBool>>,
    issues: Vec<IntegrityIssue>,
    answers: watch::Receiver<Vec<AnswerRecord>>,
    persistence: watch::Receiver<PersistState>,
    task: JoinHandle<()>,
}

impl RunningSession {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn submit_answer(&self, selected: usize) -> Result<(), SessionError> {
        self.handle.submit_answer(selected)
    }

    pub fn submit_answer_for(&self, question_index: usize, selected: usize) -> Result<(), SessionError> {
        self.handle.submit_answer_for(question_index, selected)
    }

    pub fn abort(&self) -> Result<(), SessionError> {
        self.handle.abort()
    }

    /// Next event, or `None` once the session actor has stopped and all events were read.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// The capture failure that left this session unrecorded, if any.
    pub fn device_error(&self) -> Option<&DeviceError> {
        self.device_error.as_ref()
    }

    /// Whether the microphone currently shows activity. Always false without capture.
    pub fn liveness(&self) -> bool {
        self.liveness
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Malformed questions found in the snapshot.
    pub fn integrity_issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    /// Per-question results graded so far. For operators only.
    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.answers.borrow().clone()
    }

    /// Wait for the persistence outcome.
    ///
    /// Returns `None` if the session was aborted or the actor stopped before
    /// the assessment finished.
    pub async fn persistence(&mut self) -> Option<PersistOutcome> {
        let state = self
            .persistence
            .wait_for(|s| !matches!(s, PersistState::Pending))
            .await
            .ok()?;
        match &*state {
            PersistState::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Whether the session actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts assessment sessions against one set of collaborators.
pub struct SessionOrchestrator {
    collaborators: SessionCollaborators,
    config: SessionConfig,
    gate: DeviceGate,
}

impl SessionOrchestrator {
    pub fn new(collaborators: SessionCollaborators, config: SessionConfig) -> Self {
        Self {
            collaborators,
            config,
            gate: DeviceGate::new(),
        }
    }

    /// Share a device gate with other orchestrators using the same hardware.
    pub fn with_gate(mut self, gate: DeviceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &DeviceGate {
        &self.gate
    }

    /// Start a session for `candidate_name`.
    ///
    /// Capture and the question snapshot are acquired concurrently. A capture
    /// failure does not stop the session; it is reported through
    /// [`RunningSession::device_error`] and the first event.
    pub async fn start(&self, candidate_name: &str) -> Result<RunningSession, SessionError> {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session_id);

        let focus_lock = self
            .collaborators
            .focus_lock
            .clone()
            .ok_or(SessionError::LockdownUnavailable)?;
        focus_lock
            .enter_lockdown()
            .await
            .map_err(|e| SessionError::Lockdown(format!("{e:#}")))?;

        let (capture, questions) = tokio::join!(
            MediaCaptureSession::acquire(
                Arc::clone(&self.collaborators.capture_device),
                &self.gate,
                self.config.capture.clone(),
            ),
            self.collaborators.question_bank.list_questions(),
        );

        let questions = match questions {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!(parent: &span, "question bank unavailable: {e}");
                unwind(capture, focus_lock.as_ref()).await;
                return Err(SessionError::QuestionBank(e));
            }
        };

        let mut machine = AssessmentStateMachine::new(self.config.question_duration_secs);
        let outcome = match &self.collaborators.answer_key {
            Some(key) => machine.load_with_key(questions, Arc::clone(key)),
            None => machine.load(questions),
        };
        let issues = match outcome {
            LoadOutcome::Active { issues, .. } => issues,
            LoadOutcome::Empty => {
                unwind(capture, focus_lock.as_ref()).await;
                return Err(SessionError::EmptyQuestionSet);
            }
        };

        let (capture, device_error) = match capture {
            Ok(capture) => (Some(capture), None),
            Err(e) => {
                tracing::warn!(parent: &span, "proctoring unavailable: {e}");
                (None, Some(e))
            }
        };
        let liveness = capture.as_ref().map(MediaCaptureSession::liveness_flag);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (answers_tx, answers_rx) = watch::channel(Vec::new());
        let (persist_tx, persist_rx) = watch::channel(PersistState::Pending);
        let presented = Arc::new(AtomicUsize::new(0));

        if let Some(e) = &device_error {
            let _ = event_tx.send(SessionEvent::ProctoringUnavailable(e.clone()));
        }

        let actor = SessionActor {
            candidate_name: candidate_name.to_string(),
            machine,
            timer: QuestionTimer::new(),
            capture,
            focus_lock,
            pipeline: RecordingPipeline::new(
                Arc::clone(&self.collaborators.artifact_store),
                Arc::clone(&self.collaborators.record_store),
                self.config.pipeline.clone(),
            ),
            events: event_tx,
            timer_tx,
            presented: Arc::clone(&presented),
            answers: answers_tx,
            persistence: persist_tx,
        };
        tracing::info!(parent: &span, candidate = candidate_name, "session started");
        let task = tokio::spawn(actor.run(command_rx, timer_rx).instrument(span));

        Ok(RunningSession {
            session_id,
            handle: SessionHandle {
                commands: command_tx,
                presented,
            },
            events: event_rx,
            device_error,
            liveness,
            issues,
            answers: answers_rx,
            persistence: persist_rx,
            task,
        })
    }
}

/// Undo a partial start.
async fn unwind(capture: Result<MediaCaptureSession, DeviceError>, focus_lock: &dyn FocusLock) {
    if let Ok(mut capture) = capture {
        capture.release().await;
    }
    if let Err(e) = focus_lock.exit_lockdown().await {
        tracing::warn!("failed to exit lockdown: {e:#}");
    }
}

struct SessionActor {
    candidate_name: String,
    machine: AssessmentStateMachine,
    timer: QuestionTimer,
    capture: Option<MediaCaptureSession>,
    focus_lock: Arc<dyn FocusLock>,
    pipeline: RecordingPipeline,
    events: mpsc::UnboundedSender<SessionEvent>,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
    presented: Arc<AtomicUsize>,
    answers: watch::Sender<Vec<AnswerRecord>>,
    persistence: watch::Sender<PersistState>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut timer: mpsc::UnboundedReceiver<TimerSignal>,
    ) {
        self.present_current();

        loop {
            let transition = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Answer { question_index, selected }) => {
                        self.machine.answer(question_index, Answer::Selected(selected))
                    }
                    Some(Command::Abort) | None => {
                        self.abort().await;
                        return;
                    }
                },
                Some(signal) = timer.recv() => match signal {
                    TimerSignal::Tick { question_index, remaining } => {
                        if question_index == self.machine.current_index() {
                            self.machine.tick(remaining);
                            self.emit(SessionEvent::TimerTick { remaining });
                        }
                        Transition::Ignored
                    }
                    TimerSignal::Expired { question_index } => {
                        tracing::info!(question_index, "question timed out");
                        self.machine.expire(question_index)
                    }
                },
            };

            match transition {
                Transition::Advanced { .. } => {
                    self.publish_answers();
                    self.present_current();
                }
                Transition::Finished { final_score, .. } => {
                    self.publish_answers();
                    self.finish(final_score).await;
                    return;
                }
                Transition::Ignored => {}
            }
        }
    }

    fn present_current(&mut self) {
        let Some(question) = self.machine.current_question() else {
            return;
        };
        let index = self.machine.current_index();
        let duration = self.machine.timer_duration();
        self.presented.store(index, Ordering::SeqCst);
        self.emit(SessionEvent::QuestionPresented {
            question,
            index,
            total: self.machine.total(),
            remaining_seconds: duration,
        });

        let ticks = self.timer_tx.clone();
        let expiries = self.timer_tx.clone();
        self.timer.start(
            duration,
            move |remaining| {
                let _ = ticks.send(TimerSignal::Tick {
                    question_index: index,
                    remaining,
                });
            },
            move || {
                let _ = expiries.send(TimerSignal::Expired {
                    question_index: index,
                });
            },
        );
    }

    async fn finish(&mut self, final_score: u32) {
        self.timer.cancel();
        let total = self.machine.total();
        tracing::info!(final_score, total, "assessment finished");
        self.emit(SessionEvent::Scored { final_score, total });

        if let Err(e) = self.focus_lock.exit_lockdown().await {
            tracing::warn!("failed to exit lockdown: {e:#}");
        }

        let artifact = match self.capture.as_mut() {
            Some(capture) => Some(capture.finalize().await),
            None => None,
        };
        self.capture = None;

        let pipeline = self.pipeline.clone();
        let candidate_name = self.candidate_name.clone();
        let persistence = self.persistence.clone();
        tokio::spawn(
            async move {
                let outcome = pipeline.persist(artifact, &candidate_name, final_score).await;
                persistence.send_replace(PersistState::Done(outcome));
            }
            .in_current_span(),
        );
    }

    async fn abort(&mut self) {
        self.timer.cancel();
        if let Some(mut capture) = self.capture.take() {
            capture.release().await;
        }
        if let Err(e) = self.focus_lock.exit_lockdown().await {
            tracing::warn!("failed to exit lockdown: {e:#}");
        }
        tracing::info!(
            answered = self.machine.current_index(),
            "session aborted, nothing persisted"
        );
        self.emit(SessionEvent::Aborted);
        self.persistence.send_replace(PersistState::Skipped);
    }

    fn publish_answers(&self) {
        self.answers.send_replace(self.machine.answers().to_vec());
    }

    fn emit(&self, event: SessionEvent) {
        // The presentation layer may have gone away; the session still runs to completion.
        let _ = self.events.send(event);
    }
}
