//! Chat completion types and API calls for Azure OpenAI deployments.

use azure_openai_toolkit_core::client::{path_segment, AzureOpenAiClient};
use azure_openai_toolkit_core::error::{AzureOpenAiError, AzureOpenAiResult};
use azure_openai_toolkit_core::models::Usage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A chat completion request.
///
/// `model` is the deployment name; it selects the URL path as well. When it
/// is `None`, [`complete`] uses the client's default deployment.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

/// Builder for [`ChatCompletionRequest`].
#[derive(Debug, Default)]
pub struct ChatCompletionRequestBuilder {
    model: Option<String>,
    messages: Vec<Message>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    stop: Option<Vec<String>>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
}

impl ChatCompletionRequest {
    /// Create a new builder.
    pub fn builder() -> ChatCompletionRequestBuilder {
        ChatCompletionRequestBuilder::default()
    }
}

impl ChatCompletionRequestBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn presence_penalty(mut self, penalty: f32) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    /// Build the request. At least one message is required.
    pub fn build(self) -> AzureOpenAiResult<ChatCompletionRequest> {
        if self.messages.is_empty() {
            return Err(AzureOpenAiError::configuration("at least one message is required"));
        }

        Ok(ChatCompletionRequest {
            model: self.model.filter(|m| !m.is_empty()),
            messages: self.messages,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: self.stop,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        })
    }
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
        }
    }
}

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

/// A single choice in a chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// API functions
// ---------------------------------------------------------------------------

/// Path of the chat completions endpoint for a deployment.
pub fn completions_path(deployment: &str) -> AzureOpenAiResult<String> {
    Ok(format!("openai/deployments/{}/chat/completions", path_segment(deployment)?))
}

/// Send a chat completion request to the deployment named by `request.model`,
/// or to the client's default deployment when the request names none.
///
/// # Example
///
/// ```rust,no_run
/// # use azure_openai_toolkit_core::client::AzureOpenAiClient;
/// # use azure_openai_toolkit_models::chat::*;
/// # async fn example(client: &AzureOpenAiClient) -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
/// let request = ChatCompletionRequest::builder()
///     .model("gpt-4o-mini")
///     .message(Message::system("You are a helpful assistant."))
///     .message(Message::user("What is Azure OpenAI?"))
///     .temperature(0.7)
///     .build()?;
///
/// let response = complete(client, &request).await?;
/// println!("{:?}", response.first_content());
/// # Ok(())
/// # }
/// ```
pub async fn complete(
    client: &AzureOpenAiClient,
    request: &ChatCompletionRequest,
) -> AzureOpenAiResult<ChatCompletionResponse> {
    let deployment = client.resolve_deployment(request.model.as_deref())?;
    let body = if request.model.as_deref() == Some(deployment) {
        Cow::Borrowed(request)
    } else {
        Cow::Owned(ChatCompletionRequest {
            model: Some(deployment.to_string()),
            ..request.clone()
        })
    };

    let response = client.post(&completions_path(deployment)?, &*body).await?;

    let body = response.json::<ChatCompletionResponse>().await?;
    tracing::debug!(id = %body.id, choices = body.choices.len(), "chat completion received");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chat_completion_body, setup_mock_client, TEST_API_KEY};
    use azure_openai_toolkit_core::config::{ClientConfig, ENV_DEPLOYMENT, ENV_ENDPOINT};
    use azure_openai_toolkit_core::factory::AzureOpenAiClientFactory;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // --- Builder tests ---

    #[test]
    fn builder_with_required_fields_only() {
        let request = ChatCompletionRequest::builder()
            .model("gpt-4o")
            .message(Message::user("Hello"))
            .build()
            .unwrap();

        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.messages.len(), 1);
        assert!(request.temperature.is_none());
        assert!(request.max_tokens.is_none());
    }

    #[test]
    fn builder_messages_method() {
        let request = ChatCompletionRequest::builder()
            .model("gpt-4o")
            .messages(vec![
                Message::system("System prompt"),
                Message::user("User message"),
                Message::assistant("Assistant response"),
            ])
            .build()
            .unwrap();

        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[2].role, Role::Assistant);
    }

    #[test]
    fn builder_without_messages_fails() {
        let result = ChatCompletionRequest::builder().model("gpt-4o").build();

        assert!(matches!(result, Err(AzureOpenAiError::Configuration(_))));
    }

    #[test]
    fn builder_without_model_leaves_it_unset() {
        let request = ChatCompletionRequest::builder()
            .model("")
            .message(Message::user("Hello"))
            .build()
            .unwrap();

        assert!(request.model.is_none());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
    }

    #[test]
    fn completions_path_escapes_deployment() {
        assert_eq!(
            completions_path("gpt-4o-mini").unwrap(),
            "openai/deployments/gpt-4o-mini/chat/completions"
        );
        assert_eq!(
            completions_path("dep?x=1#frag").unwrap(),
            "openai/deployments/dep%3Fx%3D1%23frag/chat/completions"
        );
        assert!(completions_path("..").is_err());
    }

    // --- Serialization tests ---

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::from_str::<Role>("\"tool\"").unwrap(), Role::Tool);
    }

    #[test]
    fn request_serialization_skips_none_fields() {
        let request = ChatCompletionRequest::builder()
            .model("gpt-4o")
            .message(Message::user("Hi"))
            .temperature(0.5)
            .build()
            .unwrap();

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["temperature"], 0.5);
        assert!(json.get("top_p").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn response_first_content() {
        let response: ChatCompletionResponse =
            serde_json::from_value(chat_completion_body("gpt-4o", "Hello!")).unwrap();

        assert_eq!(response.first_content(), Some("Hello!"));
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn response_without_choices_has_no_content() {
        let response: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-empty",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": []
        }))
        .unwrap();

        assert!(response.first_content().is_none());
        assert!(response.usage.is_none());
    }

    // --- Integration tests with wiremock ---

    #[tokio::test]
    async fn complete_posts_to_deployment_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o-mini/chat/completions"))
            .and(query_param("api-version", "2024-10-21"))
            .and(header("api-key", TEST_API_KEY))
            .and(body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello"}],
                "temperature": 1.0
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4o-mini", "Hi!")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let request = ChatCompletionRequest::builder()
            .model("gpt-4o-mini")
            .message(Message::user("Hello"))
            .temperature(1.0)
            .build()
            .unwrap();

        let response = complete(&client, &request).await.expect("should succeed");
        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.first_content(), Some("Hi!"));
    }

    #[tokio::test]
    async fn complete_uses_client_default_deployment() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o-mini/chat/completions"))
            .and(body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4o-mini", "Hi!")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::from_lookup(|name| match name {
            ENV_ENDPOINT => Some(server.uri()),
            ENV_DEPLOYMENT => Some("gpt-4o-mini".to_string()),
            _ => None,
        })
        .unwrap();
        let client = AzureOpenAiClientFactory::with_api_key(config, TEST_API_KEY)
            .unwrap()
            .create_client()
            .unwrap();
        let request = ChatCompletionRequest::builder()
            .message(Message::user("Hello"))
            .build()
            .unwrap();

        let response = complete(&client, &request).await.expect("should succeed");
        assert_eq!(response.first_content(), Some("Hi!"));
    }

    #[tokio::test]
    async fn complete_without_any_deployment_fails() {
        let server = MockServer::start().await;
        let client = setup_mock_client(&server);
        let request = ChatCompletionRequest::builder()
            .message(Message::user("Hello"))
            .build()
            .unwrap();

        let err = complete(&client, &request).await.unwrap_err();
        assert!(matches!(err, AzureOpenAiError::Configuration(_)));
    }

    #[tokio::test]
    async fn complete_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/nonexistent/chat/completions"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": "DeploymentNotFound",
                    "message": "The API deployment for this resource does not exist."
                }
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let request = ChatCompletionRequest::builder()
            .model("nonexistent")
            .message(Message::user("Hello"))
            .build()
            .unwrap();

        let err = complete(&client, &request).await.unwrap_err();
        assert!(err.to_string().contains("DeploymentNotFound"));
    }
}
