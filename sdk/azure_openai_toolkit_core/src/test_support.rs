//! Helpers for testing code built on this crate against a [`MockServer`].

use crate::client::AzureOpenAiClient;
use wiremock::MockServer;

/// Test API key (not a real key).
pub const TEST_API_KEY: &str = "test-api-key";

/// API version used by mock clients.
pub const TEST_API_VERSION: &str = "2024-10-21";

/// Unix timestamp used in test responses.
pub const TEST_TIMESTAMP: u64 = 1700000000;

/// Create an API key client connected to a mock server.
///
/// # Panics
///
/// Panics if the mock server URI is not a valid endpoint.
pub fn setup_mock_client(server: &MockServer) -> AzureOpenAiClient {
    AzureOpenAiClient::builder()
        .endpoint(server.uri())
        .api_version(TEST_API_VERSION)
        .api_key(TEST_API_KEY)
        .build()
        .expect("should build client")
}

/// A chat completion response body whose single choice says `content`.
pub fn chat_completion_body(model: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": TEST_TIMESTAMP,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}
