//! HTTP client handle for Azure OpenAI.
//!
//! [`AzureOpenAiClient`] holds the endpoint, API version, optional deployment
//! and exactly one [`Credential`]. Higher-level crates build request bodies
//! and call [`AzureOpenAiClient::post`] and friends.
//!
//! # Examples
//!
//! ## Using an API key
//! ```rust,no_run
//! use azure_openai_toolkit_core::client::AzureOpenAiClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AzureOpenAiClient::builder()
//!     .endpoint("https://your-resource.openai.azure.com/")
//!     .api_version("2024-10-21")
//!     .api_key("your-key")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using Entra ID
//! ```rust,no_run
//! use azure_openai_toolkit_core::auth::EntraIdCredential;
//! use azure_openai_toolkit_core::client::AzureOpenAiClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = EntraIdCredential::from_env()?;
//! let client = AzureOpenAiClient::builder()
//!     .endpoint("https://your-resource.openai.azure.com/")
//!     .api_version("2024-10-21")
//!     .token_provider(identity.token_provider())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthMode, Credential, TokenProvider};
use crate::error::{AzureOpenAiError, AzureOpenAiResult};
use reqwest::Client as HttpClient;
use secrecy::ExposeSecret;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read/response timeout (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Query parameter carrying the API version on every request.
pub const API_VERSION_PARAM: &str = "api-version";

/// Percent-encode one path segment, such as a deployment name or file id.
///
/// Empty, `.` and `..` segments are rejected since they would change which
/// resource the path points at.
pub fn path_segment(value: &str) -> AzureOpenAiResult<Cow<'_, str>> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(AzureOpenAiError::configuration(format!(
            "invalid path segment: {value:?}"
        )));
    }
    Ok(urlencoding::encode(value))
}

/// Client handle for the Azure OpenAI data plane.
///
/// Every handle owns its own HTTP client; two handles never share state.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    pub(crate) http: HttpClient,
    pub(crate) endpoint: Url,
    pub(crate) api_version: String,
    pub(crate) deployment: Option<String>,
    pub(crate) credential: Credential,
}

/// Builder for constructing an [`AzureOpenAiClient`].
///
/// Use [`AzureOpenAiClient::builder()`] to create a new builder.
#[derive(Debug, Default)]
pub struct AzureOpenAiClientBuilder {
    endpoint: Option<String>,
    api_version: Option<String>,
    deployment: Option<String>,
    credential: Option<Credential>,
    http_client: Option<HttpClient>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl AzureOpenAiClient {
    /// Create a new builder for configuring an `AzureOpenAiClient`.
    pub fn builder() -> AzureOpenAiClientBuilder {
        AzureOpenAiClientBuilder::default()
    }

    /// Get the base endpoint URL. Always ends with `/`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Get the API version being used.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the default deployment name, if configured.
    pub fn deployment(&self) -> Option<&str> {
        self.deployment.as_deref()
    }

    /// The deployment a request should target: `requested` if given,
    /// otherwise the client's default deployment.
    pub fn resolve_deployment<'a>(&'a self, requested: Option<&'a str>) -> AzureOpenAiResult<&'a str> {
        requested
            .filter(|d| !d.is_empty())
            .or(self.deployment())
            .ok_or_else(|| {
                AzureOpenAiError::configuration(
                    "deployment (model) name is required: set it on the request or configure a default deployment",
                )
            })
    }

    /// Get the active authentication mode.
    pub fn auth_mode(&self) -> AuthMode {
        self.credential.mode()
    }

    /// Build a full URL for an API path, including the `api-version` query.
    ///
    /// Paths are resolved relative to the endpoint, so a leading `/` is ignored.
    pub fn url(&self, path: &str) -> AzureOpenAiResult<Url> {
        let mut url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| AzureOpenAiError::invalid_endpoint_with_source("failed to construct URL", e))?;
        url.query_pairs_mut()
            .append_pair(API_VERSION_PARAM, &self.api_version);
        Ok(url)
    }

    /// Send an authenticated GET request.
    pub async fn get(&self, path: &str) -> AzureOpenAiResult<reqwest::Response> {
        let url = self.url(path)?;
        tracing::debug!(method = "GET", url = %url, "sending request");

        let request = self.credential.authorize(self.http.get(url)).await?;
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Send an authenticated POST request with a JSON body.
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> AzureOpenAiResult<reqwest::Response> {
        let url = self.url(path)?;
        let payload = serde_json::to_vec(body)?;
        tracing::debug!(method = "POST", url = %url, bytes = payload.len(), "sending request");

        let request = self
            .credential
            .authorize(self.http.post(url))
            .await?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Send an authenticated multipart POST request.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> AzureOpenAiResult<reqwest::Response> {
        let url = self.url(path)?;
        tracing::debug!(method = "POST", url = %url, "sending multipart request");

        let request = self.credential.authorize(self.http.post(url)).await?.multipart(form);
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Maximum length for error messages to prevent sensitive data leaks.
    const MAX_ERROR_MESSAGE_LEN: usize = 1000;

    /// Redact bearer tokens and `api-key` values from a message.
    pub(crate) fn sanitize_error_message(msg: &str) -> String {
        const MARKERS: [&str; 3] = ["Bearer ", "api-key: ", "api-key="];
        const REDACTED: &str = "[REDACTED]";

        let mut result = msg.to_string();
        for marker in MARKERS {
            let mut search_start = 0;
            while let Some(relative_pos) = result[search_start..].find(marker) {
                let value_start = search_start + relative_pos + marker.len();
                let value_end = result[value_start..]
                    .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '&'))
                    .map_or(result.len(), |pos| value_start + pos);

                if value_end == value_start {
                    search_start = value_start;
                    continue;
                }
                if result[value_start..value_end] != *REDACTED {
                    result.replace_range(value_start..value_end, REDACTED);
                }
                search_start = value_start + REDACTED.len();
            }
        }
        result
    }

    /// Sanitize, then truncate a message if it exceeds the maximum length.
    pub(crate) fn truncate_message(msg: &str) -> String {
        let sanitized = Self::sanitize_error_message(msg);

        if sanitized.len() > Self::MAX_ERROR_MESSAGE_LEN {
            let mut cut = Self::MAX_ERROR_MESSAGE_LEN;
            while !sanitized.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}... (truncated)", &sanitized[..cut])
        } else {
            sanitized
        }
    }

    /// Check the response status and return an error if not successful.
    async fn check_response(response: reqwest::Response) -> AzureOpenAiResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status, "request failed");

        if let Ok(error) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(err_obj) = error.get("error") {
                return Err(AzureOpenAiError::Api {
                    code: err_obj
                        .get("code")
                        .and_then(|c| c.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    message: Self::truncate_message(
                        err_obj
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or(&body),
                    ),
                });
            }
        }

        Err(AzureOpenAiError::http(status, Self::truncate_message(&body)))
    }
}

impl AzureOpenAiClientBuilder {
    /// Set the Azure OpenAI endpoint URL, e.g.
    /// `https://<resource-name>.openai.azure.com/`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the API version, e.g. `2024-10-21`.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set the default deployment name.
    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Set the credential. Replaces any credential set before.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Authenticate with Entra ID bearer tokens from `provider`.
    pub fn token_provider(self, provider: Arc<dyn TokenProvider>) -> Self {
        self.credential(Credential::token_provider(provider))
    }

    /// Authenticate with a static API key.
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.credential(Credential::api_key(key))
    }

    /// Set a custom HTTP client.
    ///
    /// **Note:** If you provide a custom HTTP client, any timeout configuration
    /// via [`connect_timeout`](Self::connect_timeout) and
    /// [`read_timeout`](Self::read_timeout) is ignored.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout for the whole request/response cycle.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Build the `AzureOpenAiClient`.
    ///
    /// # Errors
    ///
    /// Returns [`AzureOpenAiError::Configuration`] if the endpoint, API version
    /// or credential is missing, and [`AzureOpenAiError::InvalidEndpoint`] if
    /// the endpoint is not a URL. Keys and token providers are not checked
    /// until the first request.
    pub fn build(self) -> AzureOpenAiResult<AzureOpenAiClient> {
        let endpoint_str = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AzureOpenAiError::configuration("Azure OpenAI endpoint is required"))?;

        let api_version = self
            .api_version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AzureOpenAiError::configuration("Azure OpenAI API version is required"))?;

        let credential = match self.credential {
            Some(Credential::ApiKey(key)) if key.expose_secret().is_empty() => {
                return Err(AzureOpenAiError::configuration("API key must not be empty"));
            }
            Some(credential) => credential,
            None => {
                return Err(AzureOpenAiError::configuration(
                    "Provide either a token provider or an API key",
                ));
            }
        };

        let endpoint = Url::parse(&format!("{}/", endpoint_str.trim().trim_end_matches('/')))
            .map_err(|e| AzureOpenAiError::invalid_endpoint_with_source("invalid endpoint URL", e))?;

        let http = match self.http_client {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .timeout(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
                .build()?,
        };

        Ok(AzureOpenAiClient {
            http,
            endpoint,
            api_version,
            deployment: self.deployment.filter(|d| !d.is_empty()),
            credential,
        })
    }
}
