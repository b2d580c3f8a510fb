//! Camera/microphone capture for one session.
//!
//! A [`MediaCaptureSession`] holds the device exclusively from `acquire` to
//! `finalize`/`release`/drop. While live it runs two tasks: a pump that
//! appends encoded chunks to the capture buffer, and a sampler that turns
//! the device's audio level into a debounced liveness flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::DeviceError;
use crate::model::Artifact;
use crate::traits::{CaptureDevice, DeviceControl};

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Capture and liveness settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Average amplitude (0–255 scale) above which the microphone counts as live.
    pub liveness_threshold: f32,
    /// Number of samples averaged for the liveness signal.
    pub liveness_window: usize,
    /// How often the audio level is sampled. Clamped to 100–250 ms.
    pub sample_interval: Duration,
    /// MIME type of the finalized artifact.
    pub mime_type: String,
    /// File extension of the finalized artifact.
    pub extension: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            liveness_threshold: 30.0,
            liveness_window: 8,
            sample_interval: Duration::from_millis(150),
            mime_type: "video/webm".to_string(),
            extension: "webm".to_string(),
        }
    }
}

impl CaptureConfig {
    fn effective_sample_interval(&self) -> Duration {
        self.sample_interval
            .clamp(MIN_SAMPLE_INTERVAL, MAX_SAMPLE_INTERVAL)
    }
}

/// Exclusive access to a capture device.
///
/// Holds a single permit. A new session waits here until the previous
/// session's release has been observed.
#[derive(Debug, Clone)]
pub struct DeviceGate {
    permits: Arc<Semaphore>,
}

impl Default for DeviceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    async fn lease(&self) -> Result<OwnedSemaphorePermit, DeviceError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DeviceError::Busy)
    }

    fn try_lease(&self) -> Result<OwnedSemaphorePermit, DeviceError> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| DeviceError::Busy)
    }

    /// Whether no session currently holds the device.
    pub fn is_free(&self) -> bool {
        self.permits.available_permits() == 1
    }
}

/// Ordered encoded chunks, append-only until frozen into an [`Artifact`].
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    chunks: Vec<Vec<u8>>,
}

impl CaptureBuffer {
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate the chunks into one immutable artifact.
    pub fn freeze(self, mime_type: &str, extension: &str) -> Artifact {
        let chunk_count = self.chunks.len();
        let data: Vec<u8> = self.chunks.concat();
        Artifact {
            data: Arc::from(data),
            chunk_count,
            mime_type: mime_type.to_string(),
            extension: extension.to_string(),
        }
    }
}

/// Moving average over the most recent audio level samples.
#[derive(Debug)]
pub struct LivenessWindow {
    samples: VecDeque<f32>,
    capacity: usize,
    threshold: f32,
}

impl LivenessWindow {
    pub fn new(capacity: usize, threshold: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    /// Add a sample and return whether the window average exceeds the threshold.
    pub fn push(&mut self, level: f32) -> bool {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(level);
        self.average() > self.threshold
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }
}

/// Capture state for one session.
pub struct MediaCaptureSession {
    device_name: String,
    config: CaptureConfig,
    live: Arc<AtomicBool>,
    chunks_seen: Arc<AtomicUsize>,
    pump: Option<JoinHandle<CaptureBuffer>>,
    sampler: Option<JoinHandle<()>>,
    control: Option<Box<dyn DeviceControl>>,
    permit: Option<OwnedSemaphorePermit>,
    artifact: Option<Artifact>,
}

impl MediaCaptureSession {
    /// Take the device gate and open the device.
    ///
    /// Permission denial is reported once and not retried. If opening fails
    /// after the gate was taken, the gate is released before returning.
    pub async fn acquire(
        device: Arc<dyn CaptureDevice>,
        gate: &DeviceGate,
        config: CaptureConfig,
    ) -> Result<Self, DeviceError> {
        let permit = gate.lease().await?;
        let feed = match device.open().await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(device = device.name(), "capture device unavailable: {e}");
                drop(permit);
                return Err(e);
            }
        };
        tracing::info!(device = device.name(), "capture started");

        let live = Arc::new(AtomicBool::new(false));
        let chunks_seen = Arc::new(AtomicUsize::new(0));

        let pump = tokio::spawn(pump_chunks(feed.chunks, Arc::clone(&chunks_seen)));
        let sampler = tokio::spawn(sample_liveness(
            feed.audio_level,
            Arc::clone(&live),
            LivenessWindow::new(config.liveness_window, config.liveness_threshold),
            config.effective_sample_interval(),
        ));

        Ok(Self {
            device_name: device.name().to_string(),
            config,
            live,
            chunks_seen,
            pump: Some(pump),
            sampler: Some(sampler),
            control: Some(feed.control),
            permit: Some(permit),
            artifact: None,
        })
    }

    /// Whether the microphone currently shows activity.
    pub fn liveness(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// A shareable view of the liveness flag.
    pub fn liveness_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }

    /// Chunks received from the device so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks_seen.load(Ordering::Relaxed)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stop capture and return the recording.
    ///
    /// The first call stops the device, drains every chunk it produced and
    /// releases the device gate. Later calls return the same artifact
    /// without touching the device.
    pub async fn finalize(&mut self) -> Artifact {
        if let Some(artifact) = &self.artifact {
            return artifact.clone();
        }

        self.stop_device().await;

        let buffer = match self.pump.take() {
            Some(pump) => pump.await.unwrap_or_else(|e| {
                tracing::warn!(device = %self.device_name, "capture pump ended abnormally: {e}");
                CaptureBuffer::default()
            }),
            None => CaptureBuffer::default(),
        };
        self.stop_sampler();
        self.permit.take();

        let artifact = buffer.freeze(&self.config.mime_type, &self.config.extension);
        tracing::info!(
            device = %self.device_name,
            chunks = artifact.chunk_count,
            bytes = artifact.len(),
            "capture finalized"
        );
        self.artifact = Some(artifact.clone());
        artifact
    }

    /// Stop capture and discard the buffer. Used when a session is aborted.
    pub async fn release(&mut self) {
        self.stop_device().await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.stop_sampler();
        if self.permit.take().is_some() {
            tracing::info!(device = %self.device_name, "capture released");
        }
    }

    async fn stop_device(&mut self) {
        if let Some(mut control) = self.control.take() {
            if let Err(e) = control.stop().await {
                tracing::warn!(device = %self.device_name, "failed to stop capture device: {e}");
            }
        }
    }

    fn stop_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
        self.live.store(false, Ordering::Relaxed);
    }
}

impl Drop for MediaCaptureSession {
    fn drop(&mut self) {
        // Abnormal teardown: the control's own Drop releases the OS handle.
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }
}

/// Open the device and release it straight away, to check readiness before a session.
///
/// Holds the gate for the duration of the check. Fails with
/// [`DeviceError::Busy`] rather than waiting if a session holds the device.
pub async fn preflight(device: &dyn CaptureDevice, gate: &DeviceGate) -> Result<(), DeviceError> {
    let _permit = gate.try_lease()?;
    let mut feed = device.open().await?;
    feed.control.stop().await?;
    tracing::info!(device = device.name(), "capture preflight passed");
    Ok(())
}

async fn pump_chunks(
    mut chunks: mpsc::Receiver<Vec<u8>>,
    seen: Arc<AtomicUsize>,
) -> CaptureBuffer {
    let mut buffer = CaptureBuffer::default();
    while let Some(chunk) = chunks.recv().await {
        buffer.push(chunk);
        seen.store(buffer.len(), Ordering::Relaxed);
    }
    buffer
}

async fn sample_liveness(
    level: watch::Receiver<f32>,
    live: Arc<AtomicBool>,
    mut window: LivenessWindow,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let sample = *level.borrow();
        live.store(window.push(sample), Ordering::Relaxed);
    }
}
