//! Global Batch API helpers.
//!
//! A batch job reads chat completion requests from an uploaded JSONL file and
//! writes one result line per request to an output file. The deployment must
//! be a Global-Batch deployment.
//!
//! ```rust,no_run
//! # use azure_openai_toolkit_core::client::AzureOpenAiClient;
//! # use azure_openai_toolkit_models::batch::*;
//! # use std::time::Duration;
//! # async fn example(client: &AzureOpenAiClient) -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
//! let prompts = ["Say hello.", "Give a fun fact about clouds."];
//! let lines = build_batch_lines("gpt-4o-mini-batch", prompts, Some("Be concise."))?;
//!
//! let file = upload_batch_file(client, &lines).await?;
//! let batch = create_batch(client, &BatchCreateRequest::chat_completions(file.id)).await?;
//! let batch = wait_for_batch(client, &batch.id, Duration::from_secs(5)).await?;
//!
//! let replies = collect_batch_replies(client, &batch).await?;
//! println!("{:?}", replies.get("task-0"));
//! # Ok(())
//! # }
//! ```

use crate::chat::{ChatCompletionRequest, Message};
use azure_openai_toolkit_core::client::{path_segment, AzureOpenAiClient};
use azure_openai_toolkit_core::error::{AzureOpenAiError, AzureOpenAiResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Endpoint every generated batch line targets.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/chat/completions";

/// Completion window accepted by Azure for global batch jobs.
pub const DEFAULT_COMPLETION_WINDOW: &str = "24h";

const FILES_PATH: &str = "openai/files";
const BATCHES_PATH: &str = "openai/batches";

// ---------------------------------------------------------------------------
// Input file
// ---------------------------------------------------------------------------

/// One line of a batch input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRequestLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: serde_json::Value,
}

/// Custom id assigned to the prompt at `index`.
pub fn task_id(index: usize) -> String {
    format!("task-{index}")
}

/// Build one chat completion line per prompt, with ids `task-0`, `task-1`, ...
pub fn build_batch_lines<I, S>(
    deployment: &str,
    prompts: I,
    system_prompt: Option<&str>,
) -> AzureOpenAiResult<Vec<BatchRequestLine>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if deployment.is_empty() {
        return Err(AzureOpenAiError::configuration(
            "deployment (model) name is required for batch lines",
        ));
    }
    let system_prompt = system_prompt.filter(|p| !p.is_empty());

    prompts
        .into_iter()
        .enumerate()
        .map(|(index, prompt)| {
            let request = ChatCompletionRequest::builder()
                .model(deployment)
                .messages(system_prompt.map(Message::system))
                .message(Message::user(prompt))
                .build()?;

            Ok(BatchRequestLine {
                custom_id: task_id(index),
                method: "POST".to_string(),
                url: CHAT_COMPLETIONS_ENDPOINT.to_string(),
                body: serde_json::to_value(&request)?,
            })
        })
        .collect()
}

/// Serialize lines as JSONL, one object per line, newline terminated.
pub fn to_jsonl(lines: &[BatchRequestLine]) -> AzureOpenAiResult<String> {
    let mut jsonl = String::new();
    for line in lines {
        jsonl.push_str(&serde_json::to_string(line)?);
        jsonl.push('\n');
    }
    Ok(jsonl)
}

/// A file stored by the Files API.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub bytes: Option<u64>,
    pub created_at: Option<u64>,
    pub filename: Option<String>,
    pub purpose: Option<String>,
    pub status: Option<String>,
}

/// Upload `lines` as a JSONL file with purpose `batch`.
pub async fn upload_batch_file(
    client: &AzureOpenAiClient,
    lines: &[BatchRequestLine],
) -> AzureOpenAiResult<FileObject> {
    let jsonl = to_jsonl(lines)?;
    let part = reqwest::multipart::Part::bytes(jsonl.into_bytes())
        .file_name("batch_input.jsonl")
        .mime_str("application/jsonl")?;
    let form = reqwest::multipart::Form::new()
        .text("purpose", "batch")
        .part("file", part);

    let file = client
        .post_multipart(FILES_PATH, form)
        .await?
        .json::<FileObject>()
        .await?;
    tracing::debug!(file_id = %file.id, lines = lines.len(), "uploaded batch input");
    Ok(file)
}

/// Download the contents of a file as text.
pub async fn file_content(client: &AzureOpenAiClient, file_id: &str) -> AzureOpenAiResult<String> {
    let response = client
        .get(&format!("{FILES_PATH}/{}/content", path_segment(file_id)?))
        .await?;
    Ok(response.text().await?)
}

// ---------------------------------------------------------------------------
// Batch jobs
// ---------------------------------------------------------------------------

/// Request body for creating a batch job.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateRequest {
    pub input_file_id: String,
    pub endpoint: String,
    pub completion_window: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_expires_after: Option<ExpiresAfter>,
}

/// Expiration policy for a batch's output file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExpiresAfter {
    pub seconds: u64,
    pub anchor: String,
}

impl BatchCreateRequest {
    /// A chat completions batch over `input_file_id` with a 24h window.
    pub fn chat_completions(input_file_id: impl Into<String>) -> Self {
        Self {
            input_file_id: input_file_id.into(),
            endpoint: CHAT_COMPLETIONS_ENDPOINT.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
            output_expires_after: None,
        }
    }

    /// Expire the output file `seconds` after the batch was created.
    pub fn output_expires_after(mut self, seconds: u64) -> Self {
        self.output_expires_after = Some(ExpiresAfter {
            seconds,
            anchor: "created_at".to_string(),
        });
        self
    }
}

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    Failed,
    InProgress,
    Finalizing,
    Completed,
    Expired,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// Whether the job will not change state anymore.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Expired)
    }
}

/// Request totals of a batch job.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestCounts {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
}

/// A batch job.
#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: BatchStatus,
    pub endpoint: Option<String>,
    pub input_file_id: Option<String>,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub created_at: Option<u64>,
    pub request_counts: Option<RequestCounts>,
}

/// Submit a batch job.
pub async fn create_batch(client: &AzureOpenAiClient, request: &BatchCreateRequest) -> AzureOpenAiResult<Batch> {
    let batch = client.post(BATCHES_PATH, request).await?.json::<Batch>().await?;
    tracing::debug!(batch_id = %batch.id, status = ?batch.status, "batch submitted");
    Ok(batch)
}

/// Fetch the current state of a batch job.
pub async fn retrieve_batch(client: &AzureOpenAiClient, batch_id: &str) -> AzureOpenAiResult<Batch> {
    let response = client
        .get(&format!("{BATCHES_PATH}/{}", path_segment(batch_id)?))
        .await?;
    Ok(response.json::<Batch>().await?)
}

/// Poll a batch job every `poll_interval` until it reaches a terminal state.
pub async fn wait_for_batch(
    client: &AzureOpenAiClient,
    batch_id: &str,
    poll_interval: Duration,
) -> AzureOpenAiResult<Batch> {
    loop {
        let batch = retrieve_batch(client, batch_id).await?;
        tracing::debug!(batch_id, status = ?batch.status, "batch status");
        if batch.status.is_terminal() {
            return Ok(batch);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

// ---------------------------------------------------------------------------
// Output file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OutputLine {
    custom_id: String,
    response: Option<OutputResponse>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    body: Option<serde_json::Value>,
}

/// Map each `custom_id` of a batch output file to the assistant's reply.
///
/// When a line carries no chat content, its raw response body JSON is used
/// instead. Lines that are not valid output records are logged and skipped.
pub fn parse_batch_output(text: &str) -> HashMap<String, String> {
    let mut replies = HashMap::new();

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: OutputLine = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "skipping unparseable batch output line");
                continue;
            }
        };

        let body = record
            .response
            .and_then(|r| r.body)
            .unwrap_or(serde_json::Value::Null);
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        replies.insert(record.custom_id, content);
    }

    replies
}

/// Download and parse the output file of a finished batch.
pub async fn collect_batch_replies(
    client: &AzureOpenAiClient,
    batch: &Batch,
) -> AzureOpenAiResult<HashMap<String, String>> {
    let output_file_id = batch.output_file_id.as_deref().ok_or_else(|| {
        AzureOpenAiError::Batch(format!(
            "batch {} has no output file (status {:?})",
            batch.id, batch.status
        ))
    })?;

    let text = file_content(client, output_file_id).await?;
    Ok(parse_batch_output(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chat_completion_body, setup_mock_client};
    use tracing_test::traced_test;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn batch_body(status: &str, output_file_id: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": "batch_abc",
            "object": "batch",
            "endpoint": "/chat/completions",
            "input_file_id": "file-in",
            "completion_window": "24h",
            "status": status,
            "output_file_id": output_file_id,
            "error_file_id": null,
            "created_at": 1700000000,
            "request_counts": {"total": 2, "completed": 2, "failed": 0}
        })
    }

    #[test]
    fn build_batch_lines_assigns_task_ids() {
        let lines = build_batch_lines("gpt-4o-batch", ["Hello", "Bye"], Some("Be concise.")).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].custom_id, "task-0");
        assert_eq!(lines[1].custom_id, "task-1");
        assert_eq!(lines[1].method, "POST");
        assert_eq!(lines[1].url, "/chat/completions");
        assert_eq!(lines[1].body["model"], "gpt-4o-batch");
        assert_eq!(lines[1].body["messages"][0]["role"], "system");
        assert_eq!(lines[1].body["messages"][1]["content"], "Bye");
    }

    #[test]
    fn build_batch_lines_without_system_prompt() {
        let lines = build_batch_lines("gpt-4o-batch", ["Hello"], None).unwrap();
        assert_eq!(lines[0].body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn build_batch_lines_skips_empty_system_prompt() {
        let lines = build_batch_lines("gpt-4o-batch", ["Hello"], Some("")).unwrap();
        let messages = lines[0].body["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn build_batch_lines_requires_deployment() {
        let result = build_batch_lines("", ["Hello"], None);
        assert!(matches!(result, Err(AzureOpenAiError::Configuration(_))));
    }

    #[test]
    fn to_jsonl_writes_one_object_per_line() {
        let lines = build_batch_lines("d", ["a", "b", "c"], None).unwrap();
        let jsonl = to_jsonl(&lines).unwrap();

        assert_eq!(jsonl.lines().count(), 3);
        assert!(jsonl.ends_with('\n'));
        let first: BatchRequestLine = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
        assert_eq!(first, lines[0]);
    }

    #[test]
    fn create_request_serialization() {
        let request = BatchCreateRequest::chat_completions("file-in").output_expires_after(1_209_600);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "input_file_id": "file-in",
                "endpoint": "/chat/completions",
                "completion_window": "24h",
                "output_expires_after": {"seconds": 1209600, "anchor": "created_at"}
            })
        );
    }

    #[test]
    fn batch_status_terminal_states() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(BatchStatus::Expired.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
        assert!(!BatchStatus::Validating.is_terminal());

        let unknown: BatchStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(unknown, BatchStatus::Unknown);
    }

    #[test]
    #[traced_test]
    fn parse_batch_output_extracts_content_and_falls_back() {
        let ok = serde_json::json!({
            "custom_id": "task-0",
            "response": {"status_code": 200, "body": chat_completion_body("d", "Hello from Azure")}
        });
        let filtered = serde_json::json!({
            "custom_id": "task-1",
            "response": {"status_code": 400, "body": {"error": {"code": "content_filter"}}}
        });
        let text = format!("{ok}\n{filtered}\nnot json\n\n");

        let replies = parse_batch_output(&text);

        assert_eq!(replies.len(), 2);
        assert_eq!(replies["task-0"], "Hello from Azure");
        assert!(replies["task-1"].contains("content_filter"));
        assert!(logs_contain("skipping unparseable batch output line"));
    }

    #[tokio::test]
    async fn upload_and_create_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "file-in",
                "object": "file",
                "bytes": 420,
                "filename": "batch_input.jsonl",
                "purpose": "batch",
                "status": "processed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/openai/batches"))
            .and(body_json(serde_json::json!({
                "input_file_id": "file-in",
                "endpoint": "/chat/completions",
                "completion_window": "24h"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("validating", None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let lines = build_batch_lines("gpt-4o-batch", ["Hello"], None).unwrap();

        let file = upload_batch_file(&client, &lines).await.unwrap();
        assert_eq!(file.id, "file-in");
        assert_eq!(file.purpose.as_deref(), Some("batch"));

        let batch = create_batch(&client, &BatchCreateRequest::chat_completions(file.id))
            .await
            .unwrap();
        assert_eq!(batch.id, "batch_abc");
        assert_eq!(batch.status, BatchStatus::Validating);
    }

    #[tokio::test]
    async fn wait_for_batch_polls_until_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/openai/batches/batch_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("in_progress", None)))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/openai/batches/batch_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("completed", Some("file-out"))))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let batch = wait_for_batch(&client, "batch_abc", Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.output_file_id.as_deref(), Some("file-out"));
        assert_eq!(batch.request_counts.unwrap().completed, 2);
    }

    #[tokio::test]
    async fn collect_batch_replies_downloads_output() {
        let server = MockServer::start().await;

        let line = serde_json::json!({
            "custom_id": "task-0",
            "response": {"status_code": 200, "body": chat_completion_body("d", "Hi there")}
        });
        Mock::given(method("GET"))
            .and(path("/openai/files/file-out/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{line}\n")))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let batch: Batch = serde_json::from_value(batch_body("completed", Some("file-out"))).unwrap();

        let replies = collect_batch_replies(&client, &batch).await.unwrap();
        assert_eq!(replies["task-0"], "Hi there");
    }

    #[tokio::test]
    async fn ids_are_escaped_in_paths() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/openai/batches/..%2Fbatches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(batch_body("completed", None)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/openai/files/file%3Fx%3D1%23frag/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        retrieve_batch(&client, "../batches").await.unwrap();
        assert_eq!(file_content(&client, "file?x=1#frag").await.unwrap(), "");

        let dot = retrieve_batch(&client, "..").await;
        assert!(matches!(dot, Err(AzureOpenAiError::Configuration(_))));
    }

    #[tokio::test]
    async fn collect_batch_replies_without_output_file() {
        let server = MockServer::start().await;
        let client = setup_mock_client(&server);
        let batch: Batch = serde_json::from_value(batch_body("failed", None)).unwrap();

        let result = collect_batch_replies(&client, &batch).await;
        assert!(matches!(result, Err(AzureOpenAiError::Batch(_))));
    }
}
