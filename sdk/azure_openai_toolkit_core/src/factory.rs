//! Factory producing configured [`AzureOpenAiClient`] handles.
//!
//! A factory pairs a [`ClientConfig`] with exactly one [`Credential`]. Each
//! call to [`AzureOpenAiClientFactory::create_client`] builds a new,
//! independent client.
//!
//! ```rust,no_run
//! use azure_openai_toolkit_core::factory::AzureOpenAiClientFactory;
//!
//! # fn example() -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
//! // Entra ID when AZURE_CLIENT_ID, AZURE_TENANT_ID and AZURE_CLIENT_SECRET
//! // are all set, otherwise AZURE_OPENAI_API_KEY.
//! let factory = AzureOpenAiClientFactory::from_env()?;
//! let client = factory.create_client()?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthMode, Credential, EntraIdCredential, ServicePrincipalConfig, TokenProvider};
use crate::client::AzureOpenAiClient;
use crate::config::{env_lookup, ClientConfig, ENV_API_KEY};
use crate::error::{AzureOpenAiError, AzureOpenAiResult};
use std::sync::Arc;
use std::time::Duration;

/// Creates [`AzureOpenAiClient`] handles from a configuration and a credential.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClientFactory {
    config: ClientConfig,
    credential: Credential,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl AzureOpenAiClientFactory {
    /// Entra ID path: authenticate every request with `provider`.
    pub fn with_token_provider(config: ClientConfig, provider: Arc<dyn TokenProvider>) -> Self {
        Self::new(config, Credential::token_provider(provider))
    }

    /// API key path. An empty key is a configuration error.
    pub fn with_api_key(config: ClientConfig, api_key: impl Into<String>) -> AzureOpenAiResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AzureOpenAiError::configuration(format!(
                "{ENV_API_KEY} is required for API key auth"
            )));
        }
        Ok(Self::new(config, Credential::api_key(api_key)))
    }

    fn new(config: ClientConfig, credential: Credential) -> Self {
        Self {
            config,
            credential,
            connect_timeout: None,
            read_timeout: None,
        }
    }

    /// Entra ID path with endpoint, version and deployment from the environment.
    pub fn from_env_with_identity(provider: Arc<dyn TokenProvider>) -> AzureOpenAiResult<Self> {
        Ok(Self::with_token_provider(ClientConfig::from_env()?, provider))
    }

    /// API key path with every value from the environment.
    pub fn from_env_with_api_key() -> AzureOpenAiResult<Self> {
        let config = ClientConfig::from_env()?;
        Self::with_api_key(config, env_lookup(ENV_API_KEY).unwrap_or_default())
    }

    /// Select the authentication mode from the environment.
    ///
    /// Entra ID is used if and only if `AZURE_CLIENT_ID`, `AZURE_TENANT_ID`
    /// and `AZURE_CLIENT_SECRET` are all set; otherwise `AZURE_OPENAI_API_KEY`
    /// is required.
    pub fn from_env() -> AzureOpenAiResult<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> AzureOpenAiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ClientConfig::from_lookup(&lookup)?;

        match AuthMode::select(&lookup) {
            AuthMode::EntraId => {
                let identity = EntraIdCredential::new(&ServicePrincipalConfig::from_lookup(&lookup)?)?;
                tracing::info!(endpoint = %config.endpoint, "using Entra ID authentication");
                Ok(Self::with_token_provider(config, identity.token_provider()))
            }
            AuthMode::ApiKey => {
                tracing::info!(endpoint = %config.endpoint, "using API key authentication");
                Self::with_api_key(config, lookup(ENV_API_KEY).unwrap_or_default())
            }
        }
    }

    /// Set the connection timeout of created clients.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout of created clients.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.credential.mode()
    }

    /// Build a new client handle.
    pub fn create_client(&self) -> AzureOpenAiResult<AzureOpenAiClient> {
        let mut builder = AzureOpenAiClient::builder()
            .endpoint(self.config.endpoint.clone())
            .api_version(self.config.api_version.clone())
            .credential(self.credential.clone());

        if let Some(deployment) = &self.config.deployment {
            builder = builder.deployment(deployment.clone());
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            builder = builder.read_timeout(timeout);
        }

        builder.build()
    }
}
