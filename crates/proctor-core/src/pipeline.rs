//! Two-step persistence of a finished session: upload the recording, then
//! insert the session record.
//!
//! A failed upload downgrades the outcome to a partial success; a failed
//! insert is a failure. Neither ever touches the score, which was reported
//! before persistence started.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{Artifact, PersistOutcome, RecordingLoss, SessionRecord, SessionStatus};
use crate::traits::{ArtifactStore, RecordStore};

/// Naming and fallback settings for persisted sessions.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Prefix of uploaded artifact names.
    pub name_prefix: String,
    /// Name stored when the candidate name is blank.
    pub fallback_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name_prefix: "recording".to_string(),
            fallback_name: "Anonymous".to_string(),
        }
    }
}

/// Hands a finalized recording and score off to durable storage.
#[derive(Clone)]
pub struct RecordingPipeline {
    artifacts: Arc<dyn ArtifactStore>,
    records: Arc<dyn RecordStore>,
    config: PipelineConfig,
}

impl RecordingPipeline {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        records: Arc<dyn RecordStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            artifacts,
            records,
            config,
        }
    }

    /// Upload `artifact` (if any), then insert the session record.
    ///
    /// Runs each step once. The upload strictly precedes the insert.
    pub async fn persist(
        &self,
        artifact: Option<Artifact>,
        candidate_name: &str,
        score: u32,
    ) -> PersistOutcome {
        let (recording_ref, loss) = match artifact {
            Some(artifact) => {
                let name = self.artifact_name(&artifact.extension);
                match self
                    .artifacts
                    .upload(&name, &artifact.data, &artifact.mime_type)
                    .await
                {
                    Ok(url) => {
                        tracing::info!(name = %name, bytes = artifact.len(), "recording uploaded");
                        (Some(url), None)
                    }
                    Err(e) => {
                        tracing::warn!(name = %name, "recording upload failed: {e}");
                        (None, Some(RecordingLoss::UploadFailed(e.to_string())))
                    }
                }
            }
            None => {
                tracing::warn!("no recording to upload");
                (None, Some(RecordingLoss::NoEvidence))
            }
        };

        let record = SessionRecord {
            candidate_name: self.candidate_name(candidate_name),
            score,
            recording_ref,
            status: SessionStatus::Completed,
            created_at: Utc::now(),
        };

        if let Err(e) = self.records.insert(&record).await {
            tracing::error!(candidate = %record.candidate_name, score, "session record insert failed: {e}");
            return PersistOutcome::Failure {
                reason: e.to_string(),
            };
        }

        match loss {
            None => {
                tracing::info!(candidate = %record.candidate_name, score, "session persisted");
                PersistOutcome::FullSuccess { record }
            }
            Some(reason) => {
                tracing::warn!(
                    candidate = %record.candidate_name,
                    score,
                    "session persisted without recording: {reason}"
                );
                PersistOutcome::PartialSuccess { record, reason }
            }
        }
    }

    fn artifact_name(&self, extension: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            self.config.name_prefix,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        )
    }

    fn candidate_name(&self, name: &str) -> String {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.config.fallback_name.clone()
        } else {
            trimmed.to_string()
        }
    }
}
