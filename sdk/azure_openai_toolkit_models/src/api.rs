//! Capability interface over the client handle.
//!
//! Helpers such as [`ChatSession`](crate::session::ChatSession) only need the
//! two call shapes below, so they accept any [`ModelApi`] rather than a
//! concrete client.

use crate::chat::{self, ChatCompletionRequest, ChatCompletionResponse};
use crate::responses::{self, Response, ResponseRequest};
use async_trait::async_trait;
use azure_openai_toolkit_core::client::AzureOpenAiClient;
use azure_openai_toolkit_core::error::AzureOpenAiResult;

/// The chat and Responses call shapes of an Azure OpenAI client.
#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Send a chat completion request.
    async fn create_chat(&self, request: &ChatCompletionRequest) -> AzureOpenAiResult<ChatCompletionResponse>;

    /// Send a Responses API request.
    async fn create_response(&self, request: &ResponseRequest) -> AzureOpenAiResult<Response>;

    /// Deployment used when a request names none.
    fn default_deployment(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl ModelApi for AzureOpenAiClient {
    async fn create_chat(&self, request: &ChatCompletionRequest) -> AzureOpenAiResult<ChatCompletionResponse> {
        chat::complete(self, request).await
    }

    async fn create_response(&self, request: &ResponseRequest) -> AzureOpenAiResult<Response> {
        responses::create(self, request).await
    }

    fn default_deployment(&self) -> Option<&str> {
        self.deployment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;
    use crate::test_utils::{chat_completion_body, setup_mock_client};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn client_serves_both_call_shapes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("gpt-4o", "chat reply")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_1",
                "model": "gpt-4o",
                "output_text": "response reply"
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let api: &dyn ModelApi = &client;

        let chat_request = ChatCompletionRequest::builder()
            .model("gpt-4o")
            .message(Message::user("hi"))
            .build()
            .unwrap();
        let chat = api.create_chat(&chat_request).await.unwrap();
        assert_eq!(chat.first_content(), Some("chat reply"));

        let response_request = ResponseRequest::builder().model("gpt-4o").input("hi").build().unwrap();
        let response = api.create_response(&response_request).await.unwrap();
        assert_eq!(response.output_text(), "response reply");
    }
}
