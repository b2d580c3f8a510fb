//! Synthetic capture device for terminal runs and tests.
//!
//! Emits fixed-size chunks at a steady rate and a deterministic audio level
//! that wobbles around a configured base. A denied device refuses every
//! open, which exercises the unrecorded-session path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use proctor_core::error::DeviceError;
use proctor_core::traits::{CaptureDevice, CaptureFeed, DeviceControl};

const CHANNEL_CAPACITY: usize = 64;

/// A capture device that generates its own media.
#[derive(Debug)]
pub struct SyntheticDevice {
    chunk_interval: Duration,
    chunk_size: usize,
    audio_level: f32,
    denied: bool,
    opens: AtomicUsize,
}

impl SyntheticDevice {
    pub fn new(chunk_interval: Duration, chunk_size: usize) -> Self {
        Self {
            chunk_interval: chunk_interval.max(Duration::from_millis(1)),
            chunk_size: chunk_size.max(1),
            audio_level: 60.0,
            denied: false,
            opens: AtomicUsize::new(0),
        }
    }

    /// A device that always fails with `PermissionDenied`.
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::new(Duration::from_millis(250), 1)
        }
    }

    /// Base audio level on the 0–255 amplitude scale.
    pub fn with_audio_level(mut self, level: f32) -> Self {
        self.audio_level = level.clamp(0.0, 255.0);
        self
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for SyntheticDevice {
    fn name(&self) -> &str {
        if self.denied {
            "synthetic (denied)"
        } else {
            "synthetic"
        }
    }

    async fn open(&self) -> Result<CaptureFeed, DeviceError> {
        if self.denied {
            return Err(DeviceError::PermissionDenied(
                "synthetic device is configured to refuse access".into(),
            ));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (chunk_tx, chunk_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (level_tx, level_rx) = watch::channel(0.0);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(produce(
            chunk_tx,
            level_tx,
            stop_rx,
            self.chunk_interval,
            self.chunk_size,
            self.audio_level,
        ));

        Ok(CaptureFeed {
            chunks: chunk_rx,
            audio_level: level_rx,
            control: Box::new(SyntheticControl {
                stop: Some(stop_tx),
                task: Some(task),
            }),
        })
    }
}

struct SyntheticControl {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl DeviceControl for SyntheticControl {
    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| DeviceError::Failed(format!("producer task failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for SyntheticControl {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn produce(
    chunks: mpsc::Sender<Vec<u8>>,
    level: watch::Sender<f32>,
    mut stop: oneshot::Receiver<()>,
    interval: Duration,
    chunk_size: usize,
    base_level: f32,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if chunks.send(make_chunk(seq, chunk_size)).await.is_err() {
                    break;
                }
                level.send_replace(level_at(seq, base_level));
                seq += 1;
            }
        }
    }
    tracing::debug!(chunks = seq, "synthetic device stopped");
}

fn make_chunk(seq: u64, size: usize) -> Vec<u8> {
    let seed = seq.to_le_bytes();
    (0..size).map(|i| seed[i % seed.len()] ^ (i as u8)).collect()
}

fn level_at(seq: u64, base: f32) -> f32 {
    let wobble = (seq % 8) as f32 - 3.5;
    (base + wobble * 2.0).clamp(0.0, 255.0)
}
