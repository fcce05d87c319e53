//! Conversation helpers on top of [`ModelApi`].
//!
//! [`ChatSession`] keeps a message history across calls. [`quick_chat`] and
//! [`batch_chat`] are stateless: every prompt starts a fresh conversation.

use crate::api::ModelApi;
use crate::chat::{ChatCompletionRequest, Message};
use azure_openai_toolkit_core::error::{AzureOpenAiError, AzureOpenAiResult};
use futures::stream::{self, StreamExt, TryStreamExt};

/// Sampling temperature used unless [`ChatOptions::temperature`] is set.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Number of requests [`batch_chat`] keeps in flight by default.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

/// Options shared by every request of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub system_prompt: Option<String>,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A conversation with a deployment that remembers its history.
///
/// ```rust,no_run
/// # use azure_openai_toolkit_core::client::AzureOpenAiClient;
/// # use azure_openai_toolkit_models::session::{ChatOptions, ChatSession};
/// # async fn example(client: &AzureOpenAiClient) -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
/// let options = ChatOptions::new().system_prompt("You are concise.");
/// let mut session = ChatSession::new(client, "gpt-4o-mini", options)?;
///
/// let reply = session.send("Hello!").await?;
/// let follow_up = session.send("Say that again, shorter.").await?;
/// assert_eq!(session.history().len(), 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChatSession<'a, A: ModelApi + ?Sized> {
    api: &'a A,
    deployment: String,
    options: ChatOptions,
    messages: Vec<Message>,
}

impl<'a, A: ModelApi + ?Sized> ChatSession<'a, A> {
    /// Start a session. The deployment name must not be empty.
    pub fn new(api: &'a A, deployment: impl Into<String>, options: ChatOptions) -> AzureOpenAiResult<Self> {
        let deployment = deployment.into();
        if deployment.is_empty() {
            return Err(AzureOpenAiError::configuration(
                "deployment (model) name is required for ChatSession",
            ));
        }

        let mut session = Self {
            api,
            deployment,
            options,
            messages: Vec::new(),
        };
        session.reset();
        Ok(session)
    }

    /// Start a session on the API's default deployment, such as the one read
    /// from `AZURE_OPENAI_DEPLOYMENT`.
    pub fn with_default_deployment(api: &'a A, options: ChatOptions) -> AzureOpenAiResult<Self> {
        let deployment = api.default_deployment().unwrap_or_default().to_string();
        Self::new(api, deployment, options)
    }

    /// Send a user message and return the assistant's reply.
    ///
    /// Both messages are added to the history on success. On failure the
    /// history is left as it was before the call.
    pub async fn send(&mut self, user_message: impl Into<String>) -> AzureOpenAiResult<String> {
        self.messages.push(Message::user(user_message));

        let result = self.request_reply().await;
        match result {
            Ok(text) => {
                self.messages.push(Message::assistant(text.clone()));
                Ok(text)
            }
            Err(err) => {
                self.messages.pop();
                Err(err)
            }
        }
    }

    async fn request_reply(&self) -> AzureOpenAiResult<String> {
        let request = ChatCompletionRequest::builder()
            .model(self.deployment.clone())
            .messages(self.messages.iter().cloned())
            .temperature(self.options.temperature)
            .build()?;

        let response = self.api.create_chat(&request).await?;
        Ok(response.first_content().unwrap_or_default().to_string())
    }

    /// The conversation so far: system prompt (if any), then user and
    /// assistant turns in order.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Clear the history, keeping only the initial system prompt.
    pub fn reset(&mut self) {
        self.messages.clear();
        if let Some(prompt) = self.options.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            self.messages.push(Message::system(prompt));
        }
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }
}

/// Send one prompt without keeping any history.
pub async fn quick_chat<A: ModelApi + ?Sized>(
    api: &A,
    deployment: &str,
    user_message: impl Into<String>,
    options: &ChatOptions,
) -> AzureOpenAiResult<String> {
    ChatSession::new(api, deployment, options.clone())?
        .send(user_message)
        .await
}

/// Send independent prompts concurrently and return the replies in input order.
///
/// At most `max_concurrency` requests are in flight (at least one). The
/// first failing prompt, in input order, fails the whole batch.
pub async fn batch_chat<A, I, S>(
    api: &A,
    deployment: &str,
    prompts: I,
    options: &ChatOptions,
    max_concurrency: usize,
) -> AzureOpenAiResult<Vec<String>>
where
    A: ModelApi + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if deployment.is_empty() {
        return Err(AzureOpenAiError::configuration(
            "deployment (model) name is required for batch_chat",
        ));
    }

    let prompts: Vec<String> = prompts.into_iter().map(Into::into).collect();
    if prompts.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(
        deployment,
        prompts = prompts.len(),
        max_concurrency,
        "sending chat batch"
    );

    stream::iter(prompts)
        .map(|prompt| quick_chat(api, deployment, prompt, options))
        .buffered(max_concurrency.max(1))
        .try_collect()
        .await
}
