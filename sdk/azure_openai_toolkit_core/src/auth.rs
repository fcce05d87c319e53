//! Authentication for Azure OpenAI.
//!
//! Two modes are supported and exactly one is active per client:
//!
//! - Microsoft Entra ID bearer tokens, obtained through a [`TokenProvider`].
//!   [`EntraIdCredential`] builds one from service principal credentials.
//! - A static API key sent in the `api-key` header.
//!
//! Token caching and refresh belong to the identity credential. Nothing here
//! caches tokens or retries failed token requests.

use crate::config::{env_lookup, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID};
use crate::error::{AzureOpenAiError, AzureOpenAiResult};
use async_trait::async_trait;
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::ClientSecretCredential;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::Arc;

/// Token scope for Azure Cognitive Services, which covers Azure OpenAI.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Header carrying a static Azure OpenAI API key.
pub const API_KEY_HEADER: &str = "api-key";

/// Source of bearer tokens.
///
/// Each call may hit the identity provider. Implementations must return
/// a token that is valid at the time of the call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token, without the `Bearer ` prefix.
    async fn token(&self) -> AzureOpenAiResult<String>;
}

/// A [`TokenProvider`] backed by an Azure [`TokenCredential`] and a fixed scope.
#[derive(Clone)]
pub struct BearerTokenProvider {
    credential: Arc<dyn TokenCredential>,
    scope: String,
}

impl BearerTokenProvider {
    pub fn new(credential: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            credential,
            scope: scope.into(),
        }
    }

    /// The scope tokens are requested for.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl std::fmt::Debug for BearerTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenProvider")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for BearerTokenProvider {
    async fn token(&self) -> AzureOpenAiResult<String> {
        let access_token = self.credential.get_token(&[self.scope.as_str()], None).await?;
        Ok(access_token.token.secret().to_string())
    }
}

/// A [`TokenProvider`] wrapping a zero-argument async closure.
///
/// ```rust
/// use azure_openai_toolkit_core::auth::{FnTokenProvider, TokenProvider};
///
/// # async fn example() -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
/// let provider = FnTokenProvider::new(|| async { Ok("token-from-elsewhere".to_string()) });
/// assert_eq!(provider.token().await?, "token-from-elsewhere");
/// # Ok(())
/// # }
/// ```
pub struct FnTokenProvider<F> {
    f: F,
}

impl<F, Fut> FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = AzureOpenAiResult<String>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = AzureOpenAiResult<String>> + Send,
{
    async fn token(&self) -> AzureOpenAiResult<String> {
        (self.f)().await
    }
}

impl<F> std::fmt::Debug for FnTokenProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnTokenProvider")
    }
}

/// Service principal credentials: tenant id, client id and client secret.
#[derive(Clone)]
pub struct ServicePrincipalConfig {
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
}

impl ServicePrincipalConfig {
    /// Create a service principal configuration.
    ///
    /// Fails with [`AzureOpenAiError::Configuration`] naming every value that
    /// is empty.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> AzureOpenAiResult<Self> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        let missing: Vec<&str> = [
            (ENV_CLIENT_ID, client_id.is_empty()),
            (ENV_TENANT_ID, tenant_id.is_empty()),
            (ENV_CLIENT_SECRET, client_secret.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(AzureOpenAiError::configuration(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            tenant_id,
            client_id,
            client_secret: SecretString::from(client_secret),
        })
    }

    /// Load from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    pub fn from_env() -> AzureOpenAiResult<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> AzureOpenAiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(
            lookup(ENV_TENANT_ID).unwrap_or_default(),
            lookup(ENV_CLIENT_ID).unwrap_or_default(),
            lookup(ENV_CLIENT_SECRET).unwrap_or_default(),
        )
    }

    /// Whether all three service principal variables are set and non-empty.
    pub fn is_configured<F>(lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        [ENV_CLIENT_ID, ENV_TENANT_ID, ENV_CLIENT_SECRET]
            .iter()
            .all(|name| lookup(name).is_some_and(|value| !value.is_empty()))
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl std::fmt::Debug for ServicePrincipalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

/// Microsoft Entra ID credential for Azure OpenAI.
///
/// # Example
///
/// ```rust,no_run
/// use azure_openai_toolkit_core::auth::EntraIdCredential;
///
/// # async fn example() -> azure_openai_toolkit_core::error::AzureOpenAiResult<()> {
/// let identity = EntraIdCredential::from_env()?;
/// let token = identity.get_token().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EntraIdCredential {
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for EntraIdCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EntraIdCredential")
    }
}

impl EntraIdCredential {
    /// Build a client secret credential for the given service principal.
    pub fn new(config: &ServicePrincipalConfig) -> AzureOpenAiResult<Self> {
        let credential = ClientSecretCredential::new(
            &config.tenant_id,
            config.client_id.clone(),
            Secret::new(config.client_secret.expose_secret().to_string()),
            None,
        )?;
        tracing::debug!(
            tenant_id = %config.tenant_id,
            client_id = %config.client_id,
            "created client secret credential"
        );
        Ok(Self { credential })
    }

    /// Build from the `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET` environment variables.
    pub fn from_env() -> AzureOpenAiResult<Self> {
        Self::new(&ServicePrincipalConfig::from_env()?)
    }

    /// Use any other Azure token credential (managed identity, CLI, ...).
    pub fn from_credential(credential: Arc<dyn TokenCredential>) -> Self {
        Self { credential }
    }

    /// A token provider bound to [`COGNITIVE_SERVICES_SCOPE`].
    pub fn token_provider(&self) -> Arc<BearerTokenProvider> {
        Arc::new(BearerTokenProvider::new(
            Arc::clone(&self.credential),
            COGNITIVE_SERVICES_SCOPE,
        ))
    }

    /// Fetch a raw bearer token for [`COGNITIVE_SERVICES_SCOPE`].
    pub async fn get_token(&self) -> AzureOpenAiResult<String> {
        self.token_provider().token().await
    }
}

/// Authentication mode of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Entra ID bearer tokens from a [`TokenProvider`].
    EntraId,
    /// Static `api-key` header.
    ApiKey,
}

impl AuthMode {
    /// Entra ID if and only if all three service principal variables are set.
    pub fn select<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if ServicePrincipalConfig::is_configured(lookup) {
            Self::EntraId
        } else {
            Self::ApiKey
        }
    }
}

/// Credential attached to every request of a client.
#[derive(Clone)]
pub enum Credential {
    /// Entra ID bearer token authentication.
    TokenProvider(Arc<dyn TokenProvider>),

    /// Static API key authentication.
    ApiKey(SecretString),
}

impl Credential {
    /// Create an API key credential.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(SecretString::from(key.into()))
    }

    /// Create a token provider credential.
    pub fn token_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self::TokenProvider(provider)
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Self::TokenProvider(_) => AuthMode::EntraId,
            Self::ApiKey(_) => AuthMode::ApiKey,
        }
    }

    /// Attach the authentication header to a request.
    ///
    /// For token providers this fetches a token; its error is returned as is.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> AzureOpenAiResult<reqwest::RequestBuilder> {
        match self {
            Self::TokenProvider(provider) => {
                let token = provider.token().await?;
                Ok(request.bearer_auth(token))
            }
            Self::ApiKey(key) => Ok(request.header(API_KEY_HEADER, key.expose_secret())),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenProvider(_) => write!(f, "Credential::TokenProvider(..)"),
            Self::ApiKey(_) => write!(f, "Credential::ApiKey(****)"),
        }
    }
}
