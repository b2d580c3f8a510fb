//! REST store: a hosted database REST API plus an object-storage bucket.
//!
//! Tables are read and written through `/rest/v1/{table}`; recordings go to
//! `/storage/v1/object/{bucket}/{name}` and are referenced by their public
//! URL.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use proctor_core::error::StoreError;
use proctor_core::model::{Question, SessionRecord};
use proctor_core::traits::{ArtifactStore, QuestionBank, RecordStore};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for the REST store.
pub struct RestStore {
    base_url: String,
    api_key: String,
    bucket: String,
    sessions_table: String,
    questions_table: String,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: "proctoring-recordings".to_string(),
            sessions_table: "sessions".to_string(),
            questions_table: "questions".to_string(),
            client,
        })
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    pub fn with_tables(mut self, sessions_table: &str, questions_table: &str) -> Self {
        self.sessions_table = sessions_table.to_string();
        self.questions_table = questions_table.to_string();
        self
    }

    /// Public URL of an object in the recordings bucket.
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, name
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[derive(Deserialize)]
struct QuestionRow {
    id: serde_json::Value,
    text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(alias = "answer_index")]
    correct_index: usize,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        let id = match row.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Question {
            id,
            text: row.text,
            options: row.options,
            correct_index: row.correct_index,
        }
    }
}

fn network_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Unavailable(format!("request timed out after {DEFAULT_TIMEOUT_SECS}s"))
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status().as_u16();
    if status == 404 {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::NotFound(body));
    }
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Rejected {
            status,
            message: body,
        });
    }
    Ok(response)
}

#[async_trait]
impl QuestionBank for RestStore {
    #[instrument(skip(self), fields(table = %self.questions_table))]
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        let url = format!(
            "{}?select=*&order=created_at.asc",
            self.table_url(&self.questions_table)
        );
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(network_error)?;
        let rows: Vec<QuestionRow> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Serialization(format!("failed to parse questions: {e}")))?;

        tracing::debug!(count = rows.len(), "questions fetched");
        Ok(rows.into_iter().map(Question::from).collect())
    }
}

#[async_trait]
impl ArtifactStore for RestStore {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, bytes = bytes.len()))]
    async fn upload(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<String, StoreError> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, name
        );
        let response = self
            .authorized(self.client.post(url))
            .header("content-type", mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(network_error)?;
        check_status(response).await?;

        Ok(self.public_url(name))
    }
}

#[async_trait]
impl RecordStore for RestStore {
    #[instrument(skip(self, record), fields(table = %self.sessions_table, score = record.score))]
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.table_url(&self.sessions_table)))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(network_error)?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.sessions_table))]
    async fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let url = format!(
            "{}?select=*&order=created_at.desc&limit={limit}",
            self.table_url(&self.sessions_table)
        );
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(network_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Serialization(format!("failed to parse sessions: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proctor_core::model::SessionStatus;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(&server.uri(), "test-key").unwrap()
    }

    #[tokio::test]
    async fn list_questions_in_creation_order() {
        let server = MockServer::start().await;

        let rows = serde_json::json!([
            {"id": 7, "text": "First?", "options": ["a", "b"], "answer_index": 1, "created_at": "2024-01-01T00:00:00Z"},
            {"id": "q-2", "text": "Second?", "options": ["c", "d", "e"], "answer_index": 0, "created_at": "2024-01-02T00:00:00Z"}
        ]);

        Mock::given(method("GET"))
            .and(path("/rest/v1/questions"))
            .and(query_param("order", "created_at.asc"))
            .and(header("apikey", "test-key"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&rows))
            .mount(&server)
            .await;

        let questions = store(&server).list_questions().await.unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "7");
        assert_eq!(questions[0].correct_index, 1);
        assert_eq!(questions[1].id, "q-2");
        assert_eq!(questions[1].options.len(), 3);
    }

    #[tokio::test]
    async fn upload_returns_public_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/storage/v1/object/proctoring-recordings/recording-1.webm"))
            .and(header("content-type", "video/webm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"Key": "proctoring-recordings/recording-1.webm"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let url = store(&server)
            .upload("recording-1.webm", b"media", "video/webm")
            .await
            .unwrap();
        assert_eq!(
            url,
            format!(
                "{}/storage/v1/object/public/proctoring-recordings/recording-1.webm",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn upload_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("payload too large"))
            .mount(&server)
            .await;

        let err = store(&server)
            .upload("big.webm", b"media", "video/webm")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 413, .. }));
    }

    #[tokio::test]
    async fn insert_posts_record() {
        let server = MockServer::start().await;
        let record = SessionRecord {
            candidate_name: "alice".into(),
            score: 2,
            recording_ref: Some("https://files/x.webm".into()),
            status: SessionStatus::Completed,
            created_at: Utc::now(),
        };

        Mock::given(method("POST"))
            .and(path("/rest/v1/sessions"))
            .and(body_json(&record))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).insert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn list_recent_newest_first() {
        let server = MockServer::start().await;

        let rows = serde_json::json!([
            {"id": 2, "candidate_name": "bob", "score": 1, "recording_url": null, "status": "completed", "created_at": "2024-03-02T10:00:00Z"},
            {"id": 1, "candidate_name": "alice", "score": 3, "recording_url": "https://files/a.webm", "status": "completed", "created_at": "2024-03-01T10:00:00Z"}
        ]);

        Mock::given(method("GET"))
            .and(path("/rest/v1/sessions"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&rows))
            .mount(&server)
            .await;

        let records = store(&server).list_recent(5).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].candidate_name, "bob");
        assert!(records[0].recording_ref.is_none());
        assert_eq!(records[1].recording_ref.as_deref(), Some("https://files/a.webm"));
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = store(&server).list_questions().await.unwrap_err();
        match err {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_store_is_unavailable() {
        let store = RestStore::new("http://127.0.0.1:1", "k").unwrap();
        let err = store.list_questions().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn custom_bucket_and_tables() {
        let store = RestStore::new("https://db.example.com/", "k")
            .unwrap()
            .with_bucket("evidence")
            .with_tables("attempts", "items");
        assert_eq!(
            store.public_url("r.webm"),
            "https://db.example.com/storage/v1/object/public/evidence/r.webm"
        );
        assert_eq!(store.table_url(&store.sessions_table), "https://db.example.com/rest/v1/attempts");
    }
}
