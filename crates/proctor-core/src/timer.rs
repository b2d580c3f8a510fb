//! Per-question countdown timer.
//!
//! Each start/reset begins a cycle running on its own tokio task. The cycle
//! ticks once per elapsed second, measured against a fixed deadline, and
//! calls the expiry callback at most once before ending.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

type TickFn = Arc<dyn Fn(u32) + Send + Sync>;
type ExpireFn = Arc<dyn Fn() + Send + Sync>;

/// Countdown for a single question.
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct QuestionTimer {
    callbacks: Option<(TickFn, ExpireFn)>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl QuestionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown of `duration_secs`, replacing any running cycle.
    ///
    /// `on_tick` receives every new remaining value down to and including 0;
    /// `on_expire` runs once when the countdown reaches 0.
    pub fn start<T, E>(&mut self, duration_secs: u32, on_tick: T, on_expire: E)
    where
        T: Fn(u32) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        self.callbacks = Some((Arc::new(on_tick), Arc::new(on_expire)));
        self.reset(duration_secs);
    }

    /// Restart the countdown at `duration_secs` with the callbacks from the last `start`.
    ///
    /// Re-arms expiry. Does nothing if `start` was never called.
    pub fn reset(&mut self, duration_secs: u32) {
        self.cancel();
        let Some((on_tick, on_expire)) = self.callbacks.clone() else {
            tracing::warn!("question timer reset before start, ignoring");
            return;
        };
        self.generation += 1;
        let generation = self.generation;
        tracing::debug!(generation, duration_secs, "question timer cycle started");
        let started_at = Instant::now();
        self.task = Some(tokio::spawn(run_cycle(
            started_at,
            duration_secs,
            on_tick,
            on_expire,
        )));
    }

    /// Stop ticking without firing expiry.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a cycle is counting down.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of cycles started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_cycle(start: Instant, duration_secs: u32, on_tick: TickFn, on_expire: ExpireFn) {
    let deadline = start + Duration::from_secs(u64::from(duration_secs));
    let mut last = duration_secs;
    let mut next_wake = start;

    loop {
        let remaining = seconds_left(deadline, Instant::now());
        if remaining < last || remaining == 0 {
            last = remaining;
            on_tick(remaining);
        }
        // A late wake-up can skip past a boundary, so expire on <= 0 rather than == 0.
        if remaining == 0 {
            on_expire();
            return;
        }
        next_wake += Duration::from_secs(1);
        tokio::time::sleep_until(next_wake).await;
    }
}

/// Whole seconds left until `deadline`, rounded up.
fn seconds_left(deadline: Instant, now: Instant) -> u32 {
    let left = deadline.saturating_duration_since(now);
    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
