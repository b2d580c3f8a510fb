//! Configuration loading and collaborator factories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::capture::CaptureConfig;
use proctor_core::orchestrator::SessionConfig;
use proctor_core::pipeline::PipelineConfig;
use proctor_core::traits::{ArtifactStore, CaptureDevice, QuestionBank, RecordStore};

use crate::local::LocalStore;
use crate::rest::RestStore;
use crate::synthetic::SyntheticDevice;

/// Backend holding questions, recordings and session records.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// A local directory, for offline and development use.
    Local {
        #[serde(default = "default_data_dir")]
        dir: PathBuf,
    },
    /// A hosted database REST API with an object-storage bucket.
    Rest {
        base_url: String,
        #[serde(default)]
        api_key: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        #[serde(default = "default_sessions_table")]
        sessions_table: String,
        #[serde(default = "default_questions_table")]
        questions_table: String,
    },
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Local { dir } => f.debug_struct("Local").field("dir", dir).finish(),
            StoreConfig::Rest {
                base_url,
                api_key: _,
                bucket,
                sessions_table,
                questions_table,
            } => f
                .debug_struct("Rest")
                .field("base_url", base_url)
                .field("api_key", &"***")
                .field("bucket", bucket)
                .field("sessions_table", sessions_table)
                .field("questions_table", questions_table)
                .finish(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./proctor-data")
}
fn default_bucket() -> String {
    "proctoring-recordings".to_string()
}
fn default_sessions_table() -> String {
    "sessions".to_string()
}
fn default_questions_table() -> String {
    "questions".to_string()
}

/// Capture hardware used by `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// Generated media with a steady audio level.
    Synthetic {
        #[serde(default = "default_chunk_interval")]
        chunk_interval_ms: u64,
        #[serde(default = "default_chunk_size")]
        chunk_size: usize,
        #[serde(default = "default_audio_level")]
        audio_level: f32,
    },
    /// A device that always refuses access.
    Denied,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Synthetic {
            chunk_interval_ms: default_chunk_interval(),
            chunk_size: default_chunk_size(),
            audio_level: default_audio_level(),
        }
    }
}

fn default_chunk_interval() -> u64 {
    250
}
fn default_chunk_size() -> usize {
    4096
}
fn default_audio_level() -> f32 {
    60.0
}

/// `[session]` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds allowed per question.
    #[serde(default = "default_question_duration")]
    pub question_duration_secs: u32,
    /// Name recorded when the candidate name is blank.
    #[serde(default = "default_fallback_name")]
    pub candidate_fallback_name: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            question_duration_secs: default_question_duration(),
            candidate_fallback_name: default_fallback_name(),
        }
    }
}

fn default_question_duration() -> u32 {
    60
}
fn default_fallback_name() -> String {
    "Anonymous".to_string()
}

/// `[capture]` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: f32,
    #[serde(default = "default_liveness_window")]
    pub liveness_window: usize,
    /// Audio sampling period; clamped to 100–250 ms.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            liveness_threshold: default_liveness_threshold(),
            liveness_window: default_liveness_window(),
            sample_interval_ms: default_sample_interval(),
        }
    }
}

fn default_liveness_threshold() -> f32 {
    30.0
}
fn default_liveness_window() -> usize {
    8
}
fn default_sample_interval() -> u64 {
    150
}

/// `[recording]` settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            extension: default_extension(),
            mime_type: default_mime_type(),
        }
    }
}

fn default_name_prefix() -> String {
    "recording".to_string()
}
fn default_extension() -> String {
    "webm".to_string()
}
fn default_mime_type() -> String {
    "video/webm".to_string()
}

/// Top-level proctor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProctorConfig {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub recording: RecordingSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    /// TOML roster of users for `login`.
    #[serde(default)]
    pub roster: Option<PathBuf>,
}

impl ProctorConfig {
    /// Session settings in the form the orchestrator takes.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            question_duration_secs: self.session.question_duration_secs,
            capture: CaptureConfig {
                liveness_threshold: self.capture.liveness_threshold,
                liveness_window: self.capture.liveness_window,
                sample_interval: Duration::from_millis(self.capture.sample_interval_ms),
                mime_type: self.recording.mime_type.clone(),
                extension: self.recording.extension.clone(),
            },
            pipeline: PipelineConfig {
                name_prefix: self.recording.name_prefix.clone(),
                fallback_name: self.session.candidate_fallback_name.clone(),
            },
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + 2 + len];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_store_config(config: &StoreConfig) -> StoreConfig {
    match config {
        StoreConfig::Local { dir } => StoreConfig::Local {
            dir: PathBuf::from(resolve_env_vars(&dir.to_string_lossy())),
        },
        StoreConfig::Rest {
            base_url,
            api_key,
            bucket,
            sessions_table,
            questions_table,
        } => StoreConfig::Rest {
            base_url: resolve_env_vars(base_url),
            api_key: resolve_env_vars(api_key),
            bucket: bucket.clone(),
            sessions_table: sessions_table.clone(),
            questions_table: questions_table.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable override: `PROCTOR_API_KEY` (REST store only).
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("proctor.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loading config");
            toml::from_str::<ProctorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProctorConfig::default(),
    };

    if let Ok(key) = std::env::var("PROCTOR_API_KEY") {
        if let StoreConfig::Rest { api_key, .. } = &mut config.store {
            *api_key = key;
        }
    }

    config.store = resolve_store_config(&config.store);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}

/// The three storage collaborators, backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub question_bank: Arc<dyn QuestionBank>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub record_store: Arc<dyn RecordStore>,
}

/// Create the storage collaborators from their configuration.
pub fn create_stores(config: &StoreConfig) -> Result<Stores> {
    match config {
        StoreConfig::Local { dir } => {
            let store = Arc::new(
                LocalStore::open(dir)
                    .with_context(|| format!("failed to open local store: {}", dir.display()))?,
            );
            Ok(Stores {
                question_bank: store.clone(),
                artifact_store: store.clone(),
                record_store: store,
            })
        }
        StoreConfig::Rest {
            base_url,
            api_key,
            bucket,
            sessions_table,
            questions_table,
        } => {
            if api_key.is_empty() {
                tracing::warn!("REST store configured without an API key");
            }
            let store = Arc::new(
                RestStore::new(base_url, api_key)
                    .context("failed to build REST store client")?
                    .with_bucket(bucket)
                    .with_tables(sessions_table, questions_table),
            );
            Ok(Stores {
                question_bank: store.clone(),
                artifact_store: store.clone(),
                record_store: store,
            })
        }
    }
}

/// Create the capture device from its configuration.
pub fn create_device(config: &DeviceConfig) -> Arc<dyn CaptureDevice> {
    match config {
        DeviceConfig::Synthetic {
            chunk_interval_ms,
            chunk_size,
            audio_level,
        } => Arc::new(
            SyntheticDevice::new(Duration::from_millis(*chunk_interval_ms), *chunk_size)
                .with_audio_level(*audio_level),
        ),
        DeviceConfig::Denied => Arc::new(SyntheticDevice::denied()),
    }
}
