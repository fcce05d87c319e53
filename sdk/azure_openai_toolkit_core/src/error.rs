use thiserror::Error;

/// Errors that can occur when configuring or calling Azure OpenAI.
#[derive(Error, Debug)]
pub enum AzureOpenAiError {
    /// A required configuration value is missing or empty.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL: {message}")]
    InvalidEndpoint {
        message: String,
        #[source]
        source: url::ParseError,
    },

    /// The identity provider rejected or failed a token request.
    #[error(transparent)]
    Identity(#[from] azure_core::Error),

    /// A custom token provider failed.
    #[error("Token provider error: {0}")]
    TokenProvider(String),

    /// The request failed due to an HTTP error.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The API returned an error response.
    #[error("API error ({code}): {message}")]
    Api { code: String, message: String },

    /// The request payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request failed at the transport level.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// A batch job failed or produced unusable output.
    #[error("Batch error: {0}")]
    Batch(String),
}

impl AzureOpenAiError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_endpoint_with_source(
        message: impl Into<String>,
        source: url::ParseError,
    ) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` for missing or invalid configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidEndpoint { .. })
    }
}

/// Result type alias for toolkit operations.
pub type AzureOpenAiResult<T> = std::result::Result<T, AzureOpenAiError>;
