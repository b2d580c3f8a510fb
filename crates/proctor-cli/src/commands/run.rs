//! The `proctor run` command.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use proctor_core::capture::{preflight, DeviceGate};
use proctor_core::model::PersistOutcome;
use proctor_core::orchestrator::{
    RunningSession, SessionCollaborators, SessionEvent, SessionOrchestrator,
};
use proctor_core::traits::FocusLock;
use proctor_stores::{create_device, create_stores, load_config_from};

use crate::commands::login::{authenticate, load_roster};
use crate::lockdown::TerminalLock;

pub async fn execute(
    username: String,
    password: String,
    check_only: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let device = create_device(&config.device);

    if check_only {
        preflight(device.as_ref(), &DeviceGate::new())
            .await
            .with_context(|| format!("capture device {} is not ready", device.name()))?;
        println!("Capture device ready: {}", device.name());
        return Ok(());
    }

    let roster = load_roster(&config)?;
    let role = authenticate(&roster, &username, &password).await?;
    anyhow::ensure!(
        role.may_take_assessment(),
        "{username} has the {role} role; only candidates can sit an assessment"
    );
    let candidate_name = roster
        .profile(&username)
        .map(|p| p.display_name(&username))
        .unwrap_or_else(|| username.clone());

    let stores = create_stores(&config.store)?;
    let lock = Arc::new(TerminalLock::new());
    let collaborators = SessionCollaborators {
        question_bank: stores.question_bank,
        artifact_store: stores.artifact_store,
        record_store: stores.record_store,
        capture_device: device,
        focus_lock: Some(lock.clone()),
        answer_key: None,
    };
    let orchestrator = SessionOrchestrator::new(collaborators, config.session_config());

    let mut session = orchestrator
        .start(&candidate_name)
        .await
        .context("could not start the assessment")?;
    println!("Session {}", session.session_id());

    let finished = drive(&mut session).await?;

    if finished {
        report_persistence(session.persistence().await);
    } else {
        println!("Assessment abandoned. Nothing was recorded.");
    }

    lock.quit().await?;
    Ok(())
}

/// Questions waiting for input, and input waiting for a question.
///
/// Lines typed ahead of a question are held for it. Lines typed after a
/// question expired belong to that question and are dropped.
#[derive(Default)]
struct InputQueue {
    awaiting: Option<(usize, usize)>,
    expired: Option<usize>,
    pending: VecDeque<String>,
}

enum Input {
    Answer { index: usize, selected: usize },
    Abort,
    Invalid(String),
    Late(usize),
    Wait,
}

impl InputQueue {
    fn present(&mut self, index: usize, option_count: usize) -> Input {
        self.awaiting = Some((index, option_count));
        self.expired = None;
        match self.pending.pop_front() {
            Some(line) => self.take(line),
            None => Input::Wait,
        }
    }

    fn line(&mut self, line: String) -> Input {
        if self.awaiting.is_some() {
            return self.take(line);
        }
        if let Some(index) = self.expired {
            if is_quit(&line) {
                return Input::Abort;
            }
            return Input::Late(index);
        }
        self.pending.push_back(line);
        Input::Wait
    }

    fn take(&mut self, line: String) -> Input {
        if is_quit(&line) {
            return Input::Abort;
        }
        let trimmed = line.trim();
        let Some((index, option_count)) = self.awaiting else {
            return Input::Wait;
        };
        match trimmed.parse::<usize>() {
            Ok(n) if (1..=option_count).contains(&n) => {
                self.awaiting = None;
                Input::Answer {
                    index,
                    selected: n - 1,
                }
            }
            _ => Input::Invalid(format!("enter a number between 1 and {option_count}, or q to quit")),
        }
    }

    /// The current question timed out.
    fn close(&mut self) {
        if let Some((index, _)) = self.awaiting.take() {
            self.expired = Some(index);
        }
    }
}

fn is_quit(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.eq_ignore_ascii_case("q") || trimmed.eq_ignore_ascii_case("quit")
}

enum Step {
    Event(Option<SessionEvent>),
    Line(std::io::Result<Option<String>>),
}

/// Run the session to its end. Returns whether it finished (rather than aborted).
async fn drive(session: &mut RunningSession) -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut queue = InputQueue::default();

    loop {
        let step = tokio::select! {
            event = session.next_event() => Step::Event(event),
            line = lines.next_line(), if stdin_open => Step::Line(line),
        };

        let input = match step {
            Step::Event(None) => anyhow::bail!("session ended unexpectedly"),
            Step::Event(Some(event)) => match event {
                SessionEvent::ProctoringUnavailable(e) => {
                    println!("Proctoring unavailable ({e}). The assessment continues without a recording.");
                    Input::Wait
                }
                SessionEvent::QuestionPresented {
                    question,
                    index,
                    total,
                    remaining_seconds,
                } => {
                    let mic = if session.device_error().is_some() {
                        "off"
                    } else if session.liveness() {
                        "live"
                    } else {
                        "silent"
                    };
                    println!("\nQuestion {}/{total} ({remaining_seconds}s, mic {mic})", index + 1);
                    println!("{}", question.text);
                    for (i, option) in question.options.iter().enumerate() {
                        println!("  {}) {option}", i + 1);
                    }
                    queue.present(index, question.options.len())
                }
                SessionEvent::TimerTick { remaining } => {
                    if remaining == 10 || remaining == 5 {
                        println!("  {remaining}s left");
                    } else if remaining == 0 {
                        println!("  Time's up.");
                        queue.close();
                    }
                    Input::Wait
                }
                SessionEvent::Scored { final_score, total } => {
                    println!("\nScore: {final_score}/{total}");
                    return Ok(true);
                }
                SessionEvent::Aborted => return Ok(false),
            },
            Step::Line(Ok(Some(line))) => queue.line(line),
            Step::Line(Ok(None)) => {
                stdin_open = false;
                Input::Wait
            }
            Step::Line(Err(e)) => {
                tracing::warn!("failed to read input: {e}");
                stdin_open = false;
                Input::Wait
            }
        };

        match input {
            // The session may close between reading a line and sending it; its
            // terminal event is still queued, so a send failure is not an error here.
            Input::Answer { index, selected } => {
                if let Err(e) = session.submit_answer_for(index, selected) {
                    tracing::debug!("answer not delivered: {e}");
                }
            }
            Input::Abort => {
                if let Err(e) = session.abort() {
                    tracing::debug!("abort not delivered: {e}");
                }
            }
            Input::Invalid(message) => println!("  {message}"),
            Input::Late(index) => {
                println!("  Too late for question {}; that answer was not recorded.", index + 1)
            }
            Input::Wait => {}
        }
    }
}

fn report_persistence(outcome: Option<PersistOutcome>) {
    match outcome {
        Some(PersistOutcome::FullSuccess { record }) => {
            println!(
                "Session saved with recording: {}",
                record.recording_ref.as_deref().unwrap_or_default()
            );
        }
        Some(PersistOutcome::PartialSuccess { reason, .. }) => {
            println!("Session saved without recording ({reason}).");
        }
        Some(PersistOutcome::Failure { reason }) => {
            eprintln!("Warning: session record could not be saved: {reason}");
        }
        None => eprintln!("Warning: session ended before it could be saved"),
    }
}
