//! Responses API types and calls.
//!
//! The Responses API is the unified call shape served at `openai/responses`.
//! Unlike chat completions, the deployment travels only in the `model` field.

use crate::chat::Role;
use azure_openai_toolkit_core::client::AzureOpenAiClient;
use azure_openai_toolkit_core::error::{AzureOpenAiError, AzureOpenAiResult};
use azure_openai_toolkit_core::models::ResponseUsage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Path of the Responses API.
pub const RESPONSES_PATH: &str = "openai/responses";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A Responses API request.
///
/// When `model` is `None`, [`create`] uses the client's default deployment.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: ResponseInput,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Input of a Responses API request: plain text or a list of messages.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Messages(Vec<InputMessage>),
}

impl From<&str> for ResponseInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ResponseInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A message used as Responses API input.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputMessage {
    pub role: Role,
    pub content: String,
}

/// Builder for [`ResponseRequest`].
#[derive(Debug, Default)]
pub struct ResponseRequestBuilder {
    model: Option<String>,
    input: Option<ResponseInput>,
    instructions: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl ResponseRequest {
    pub fn builder() -> ResponseRequestBuilder {
        ResponseRequestBuilder::default()
    }
}

impl ResponseRequestBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn input(mut self, input: impl Into<ResponseInput>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    /// Build the request. `input` is required.
    pub fn build(self) -> AzureOpenAiResult<ResponseRequest> {
        let model = self.model.filter(|m| !m.is_empty());
        let input = self
            .input
            .ok_or_else(|| AzureOpenAiError::configuration("input is required"))?;

        Ok(ResponseRequest {
            model,
            input,
            instructions: self.instructions,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A Responses API result.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub object: String,
    pub created_at: Option<u64>,
    pub status: Option<String>,
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    /// Aggregated text, when the service includes it.
    pub output_text: Option<String>,
    pub usage: Option<ResponseUsage>,

    /// The response body as received. Only filled in by [`create`]; `Null`
    /// for a `Response` deserialized some other way.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// One item of a response's `output` array.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

/// A content part of an output item.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl Response {
    /// Text of the response.
    ///
    /// Uses `output_text` when present. Otherwise joins the `output_text`
    /// parts of the first output item that has any, separated by newlines.
    /// Falls back to the raw JSON body, or to the serialized fields of this
    /// response when no raw body was kept.
    pub fn output_text(&self) -> String {
        if let Some(text) = &self.output_text {
            return text.clone();
        }

        let texts = self.output.iter().find_map(|item| {
            let parts: Vec<&str> = item
                .content
                .iter()
                .filter(|part| part.kind == "output_text")
                .filter_map(|part| part.text.as_deref())
                .collect();
            (!parts.is_empty()).then_some(parts)
        });

        match texts {
            Some(parts) => parts.join("\n"),
            None if self.raw.is_null() => self.summary_json().to_string(),
            None => self.raw.to_string(),
        }
    }

    fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "object": self.object,
            "created_at": self.created_at,
            "status": self.status,
            "model": self.model,
            "output": self.output.iter().map(|item| item.kind.as_str()).collect::<Vec<_>>(),
        })
    }
}

// ---------------------------------------------------------------------------
// API functions
// ---------------------------------------------------------------------------

/// Create a response.
///
/// # Example
///
/// ```rust,no_run
/// # use azure_openai_toolkit_core::client::AzureOpenAiClient;
/// # use azure_openai_toolkit_models::responses::*;
/// # async fn example(client: &AzureOpenAiClient) -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
/// let request = ResponseRequest::builder()
///     .model("gpt-4o-mini")
///     .input("Write a haiku about Rust.")
///     .build()?;
///
/// let response = create(client, &request).await?;
/// println!("{}", response.output_text());
/// # Ok(())
/// # }
/// ```
pub async fn create(client: &AzureOpenAiClient, request: &ResponseRequest) -> AzureOpenAiResult<Response> {
    let deployment = client.resolve_deployment(request.model.as_deref())?;
    let body = if request.model.as_deref() == Some(deployment) {
        Cow::Borrowed(request)
    } else {
        Cow::Owned(ResponseRequest {
            model: Some(deployment.to_string()),
            ..request.clone()
        })
    };

    let raw = client
        .post(RESPONSES_PATH, &*body)
        .await?
        .json::<serde_json::Value>()
        .await?;

    let mut response: Response = serde_json::from_value(raw.clone())?;
    response.raw = raw;
    tracing::debug!(id = %response.id, status = ?response.status, "response received");
    Ok(response)
}
