//! `reqwest` client for the Gemini batch, files and download endpoints.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use gembatch_shared::{
    AppConfig, BatchApi, BatchJob, GembatchError, Result, SubmissionPayload, UploadedFile,
    resolve_api_key,
};

use crate::wire;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("gembatch/", env!("CARGO_PKG_VERSION"));

/// REST API version segment.
const API_VERSION: &str = "v1beta";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl GeminiClientConfig {
    /// Resolve settings from the app config and the API key env var.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.gemini.base_url).map_err(|e| {
            GembatchError::config(format!(
                "invalid gemini.base_url `{}`: {e}",
                config.gemini.base_url
            ))
        })?;
        Ok(Self {
            base_url,
            api_key: resolve_api_key(config)?,
            timeout: Duration::from_secs(config.gemini.request_timeout_secs),
        })
    }
}

/// Gemini API client implementing [`BatchApi`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GembatchError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn api_url(&self, resource: &str) -> String {
        format!("{}/{API_VERSION}/{resource}", self.base)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Send a request and read the JSON body, mapping non-2xx to remote errors.
    async fn send_json(&self, operation: &str, request: RequestBuilder) -> Result<Value> {
        let response = self.send(operation, request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| GembatchError::Network(format!("{operation}: failed to read body: {e}")))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| GembatchError::parse(format!("{operation}: invalid JSON response: {e}")))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| GembatchError::Network(format!("{operation}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = wire::error_message(&body).unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {status}: {snippet}")
        });
        Err(GembatchError::remote(operation, message))
    }
}

#[async_trait]
impl BatchApi for GeminiClient {
    /// Resumable upload: open a session, then send the bytes and finalize.
    #[instrument(skip_all, fields(path = %path.display(), mime_type = %mime_type))]
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: Option<&str>,
    ) -> Result<UploadedFile> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GembatchError::io(path, e))?;
        let display_name = display_name
            .map(str::to_string)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().to_string()));

        let start_url = format!("{}/upload/{API_VERSION}/files", self.base);
        let start = self
            .request(Method::POST, &start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }));
        let response = self.send("upload_file", start).await?;

        let session_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                GembatchError::remote("upload_file", "upload session URL missing from response")
            })?;
        debug!(size = bytes.len(), "upload session opened");

        let upload = self
            .request(Method::POST, &session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes);
        let value = self.send_json("upload_file", upload).await?;
        let file = wire::parse_file(&value)?;

        info!(file = %file.name, "file uploaded");
        Ok(file)
    }

    #[instrument(skip_all, fields(kind = %payload.kind, model = %payload.model))]
    async fn create_job(&self, payload: &SubmissionPayload) -> Result<BatchJob> {
        let body = wire::create_body(payload)?;
        let model = wire::qualify("models", &payload.model)?;
        let url = self.api_url(&format!("{model}:{}", wire::create_method(payload.kind)));

        let value = self
            .send_json("create_job", self.request(Method::POST, &url).json(&body))
            .await?;
        let job = wire::parse_batch(&value)?;
        info!(job = %job.name, state = %job.state, "batch job created");
        Ok(job)
    }

    async fn get_job(&self, name: &str) -> Result<BatchJob> {
        let name = wire::qualify("batches", name)?;
        let value = self
            .send_json("get_job", self.request(Method::GET, &self.api_url(&name)))
            .await?;
        wire::parse_batch(&value)
    }

    async fn cancel_job(&self, name: &str) -> Result<()> {
        let name = wire::qualify("batches", name)?;
        let url = self.api_url(&format!("{name}:cancel"));
        self.send("cancel_job", self.request(Method::POST, &url))
            .await?;
        info!(job = %name, "cancellation requested");
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        let name = wire::qualify("batches", name)?;
        self.send("delete_job", self.request(Method::DELETE, &self.api_url(&name)))
            .await?;
        info!(job = %name, "batch job deleted");
        Ok(())
    }

    async fn download_file(&self, name: &str) -> Result<Vec<u8>> {
        let name = wire::qualify("files", name)?;
        let url = format!("{}/download/{API_VERSION}/{name}:download", self.base);
        let response = self
            .send(
                "download_file",
                self.request(Method::GET, &url).query(&[("alt", "media")]),
            )
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GembatchError::Network(format!("download_file: {e}")))?;
        debug!(file = %name, size = bytes.len(), "file downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gembatch_shared::{BatchDestination, JobConfig, JobKind, JobState};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiClientConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            api_key: "test-key".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_content_job_from_file() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:batchGenerateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "batch": {"input_config": {"file_name": "files/in-1"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "batches/b1",
                "metadata": {"state": "BATCH_STATE_PENDING", "displayName": "run"}
            })))
            .mount(&server)
            .await;

        let payload = SubmissionPayload {
            kind: JobKind::Content,
            model: "gemini-2.5-flash".into(),
            src: Some(Value::String("files/in-1".into())),
            requests: None,
            config: JobConfig {
                display_name: Some("run".into()),
            },
        };
        let job = client_for(&server).create_job(&payload).await.unwrap();
        assert_eq!(job.name, "batches/b1");
        assert_eq!(job.state, JobState::Pending);
    }

    #[tokio::test]
    async fn create_embedding_job_uses_async_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-embedding-001:asyncBatchEmbedContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "batches/e1",
                "metadata": {"state": "BATCH_STATE_RUNNING"}
            })))
            .mount(&server)
            .await;

        let payload = SubmissionPayload {
            kind: JobKind::Embedding,
            model: "models/gemini-embedding-001".into(),
            src: Some(serde_json::json!({"file_name": "files/emb"})),
            requests: None,
            config: JobConfig::default(),
        };
        let job = client_for(&server).create_job(&payload).await.unwrap();
        assert_eq!(job.state, JobState::Running);
    }

    #[tokio::test]
    async fn remote_rejection_carries_provider_message() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/batches/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "Batch not found", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).get_job("missing").await.unwrap_err();
        match err {
            GembatchError::RemoteOperationFailed { operation, message } => {
                assert_eq!(operation, "get_job");
                assert_eq!(message, "Batch not found");
            }
            other => panic!("expected RemoteOperationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_job_reads_file_destination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/batches/b2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "batches/b2",
                "metadata": {
                    "state": "BATCH_STATE_SUCCEEDED",
                    "output": {"responsesFile": "files/results-b2"},
                    "batchStats": {"requestCount": "2", "successfulRequestCount": "2"}
                },
                "done": true
            })))
            .mount(&server)
            .await;

        let job = client_for(&server).get_job("batches/b2").await.unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(
            job.dest,
            Some(BatchDestination::File("files/results-b2".into()))
        );
        assert_eq!(job.stats.unwrap().success_count, 2);
    }

    #[tokio::test]
    async fn resumable_upload_two_steps() {
        let server = MockServer::start().await;
        let session = format!("{}/upload-session/s1", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .and(header("X-Goog-Upload-Header-Content-Type", "application/jsonl"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session.as_str()))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session/s1"))
            .and(header("X-Goog-Upload-Offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": {"name": "files/up-1", "mimeType": "application/jsonl", "sizeBytes": "12"}
            })))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("gb-upload-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("requests.jsonl");
        std::fs::write(&file, "{\"key\":1}\n\n").unwrap();

        let uploaded = client_for(&server)
            .upload_file(&file, "application/jsonl", None)
            .await
            .unwrap();
        assert_eq!(uploaded.name, "files/up-1");
        assert_eq!(uploaded.size_bytes, Some(12));
    }

    #[tokio::test]
    async fn download_returns_raw_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/download/v1beta/files/results-b2:download"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"key\":\"request-1\"}\n"))
            .mount(&server)
            .await;

        let bytes = client_for(&server)
            .download_file("results-b2")
            .await
            .unwrap();
        assert_eq!(bytes, b"{\"key\":\"request-1\"}\n");
    }

    #[tokio::test]
    async fn cancel_and_delete_hit_job_resource() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/batches/b3:cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/batches/b3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.cancel_job("b3").await.unwrap();
        client.delete_job("batches/b3").await.unwrap();
    }
}
