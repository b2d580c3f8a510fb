//! Local directory store.
//!
//! Layout under the store directory:
//! - `questions.toml`: the question bank
//! - `artifacts/<name>`: uploaded recordings
//! - `sessions.jsonl`: one session record per line

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;

use proctor_core::error::StoreError;
use proctor_core::model::{Question, SessionRecord};
use proctor_core::parser::parse_question_bank_str;
use proctor_core::traits::{ArtifactStore, QuestionBank, RecordStore};

const QUESTIONS_FILE: &str = "questions.toml";
const SESSIONS_FILE: &str = "sessions.jsonl";
const ARTIFACTS_DIR: &str = "artifacts";

/// Question bank, artifact store and record store backed by a directory.
pub struct LocalStore {
    root: PathBuf,
    // Serializes appends to the sessions log.
    append: Mutex<()>,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root.join(ARTIFACTS_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            append: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn questions_path(&self) -> PathBuf {
        self.root.join(QUESTIONS_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.root.join(SESSIONS_FILE)
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(ARTIFACTS_DIR).join(name)
    }
}

fn check_artifact_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == "..";
    if bad {
        return Err(StoreError::Rejected {
            status: 400,
            message: format!("invalid artifact name: {name:?}"),
        });
    }
    Ok(())
}

#[async_trait]
impl QuestionBank for LocalStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        let path = self.questions_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let set = parse_question_bank_str(&content, &path)
            .map_err(|e| StoreError::Serialization(format!("{e:#}")))?;
        Ok(set.questions)
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload(&self, name: &str, bytes: &[u8], _mime_type: &str) -> Result<String, StoreError> {
        check_artifact_name(name)?;
        let path = self.artifact_path(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path.display().to_string())
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    #[instrument(skip(self, record), fields(score = record.score))]
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.append.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.sessions_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(self.sessions_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(line = n + 1, "skipping malformed session record: {e}"),
            }
        }

        // Newest first; ties keep the later line first.
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proctor_core::model::SessionStatus;

    fn record(name: &str, minutes_ago: i64) -> SessionRecord {
        SessionRecord {
            candidate_name: name.into(),
            score: 1,
            recording_ref: None,
            status: SessionStatus::Completed,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn reads_question_bank() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(QUESTIONS_FILE),
            r#"
[bank]
id = "local"
name = "Local"

[[questions]]
id = "q1"
text = "Pick b"
options = ["a", "b"]
correct_index = 1
"#,
        )
        .unwrap();

        let store = LocalStore::open(dir.path()).unwrap();
        let questions = store.list_questions().await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_index, 1);
    }

    #[tokio::test]
    async fn missing_question_bank_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.list_questions().await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upload_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let reference = store
            .upload("recording-1.webm", b"media", "video/webm")
            .await
            .unwrap();

        assert!(reference.ends_with("recording-1.webm"));
        assert_eq!(
            std::fs::read(store.artifact_path("recording-1.webm")).unwrap(),
            b"media"
        );
    }

    #[tokio::test]
    async fn upload_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let err = store
            .upload("../escape.webm", b"x", "video/webm")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn records_round_trip_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        store.insert(&record("old", 30)).await.unwrap();
        store.insert(&record("new", 1)).await.unwrap();
        store.insert(&record("middle", 10)).await.unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(store.sessions_path())
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"not json\n"))
            .unwrap();

        let recent = store.list_recent(2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|r| r.candidate_name.as_str()).collect();
        assert_eq!(names, vec!["new", "middle"]);
    }

    #[tokio::test]
    async fn empty_log_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }
}
