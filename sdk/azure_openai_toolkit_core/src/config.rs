//! Explicit configuration for Azure OpenAI clients.
//!
//! Environment variables are read only by the `from_env` constructors. Each of
//! them delegates to a `from_lookup` variant so callers (and tests) can supply
//! values from any source.

use crate::error::{AzureOpenAiError, AzureOpenAiResult};

/// Service principal client id.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Entra ID tenant id.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Service principal secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Azure OpenAI resource endpoint.
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
/// Azure OpenAI data plane API version.
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
/// Static API key for key-based access.
pub const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";
/// Deployment name used as the model identifier.
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";

/// API version used when `AZURE_OPENAI_API_VERSION` is not set.
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Read a variable from the process environment. Empty values count as unset.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Endpoint, API version and optional deployment for an Azure OpenAI resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_version: String,
    pub deployment: Option<String>,
}

impl ClientConfig {
    /// Create a configuration. Both values must be non-empty.
    pub fn new(endpoint: impl Into<String>, api_version: impl Into<String>) -> AzureOpenAiResult<Self> {
        let endpoint = endpoint.into();
        let api_version = api_version.into();

        if endpoint.trim().is_empty() {
            return Err(AzureOpenAiError::configuration(format!(
                "Azure OpenAI endpoint is required (set {ENV_ENDPOINT})"
            )));
        }
        if api_version.trim().is_empty() {
            return Err(AzureOpenAiError::configuration(format!(
                "Azure OpenAI API version is required (set {ENV_API_VERSION})"
            )));
        }

        Ok(Self {
            endpoint,
            api_version,
            deployment: None,
        })
    }

    /// Set the deployment name used as the default model identifier.
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        let deployment = deployment.into();
        self.deployment = (!deployment.is_empty()).then_some(deployment);
        self
    }

    /// Load the configuration from `AZURE_OPENAI_*` environment variables.
    pub fn from_env() -> AzureOpenAiResult<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Load the configuration through `lookup`.
    ///
    /// The endpoint is required; the API version falls back to
    /// [`DEFAULT_API_VERSION`].
    pub fn from_lookup<F>(lookup: F) -> AzureOpenAiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_ENDPOINT).filter(|v| !v.is_empty()).ok_or_else(|| {
            AzureOpenAiError::configuration(format!("{ENV_ENDPOINT} must be set in environment"))
        })?;
        let api_version = lookup(ENV_API_VERSION)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let config = Self::new(endpoint, api_version)?;
        Ok(match lookup(ENV_DEPLOYMENT) {
            Some(deployment) => config.with_deployment(deployment),
            None => config,
        })
    }
}
