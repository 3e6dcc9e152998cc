//! Portal API client implementation.

use halide_core::{
    classify, AccessToken, ClusterError, JwkSet, Outcome, RegistrationRequest,
    RegistrationResponse, Result,
};
use reqwest::header::ACCEPT;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Node registration endpoint
pub const REGISTER_PATH: &str = "/api/v1/cluster/nodes/register";

/// Theme bundle endpoint
pub const THEME_PATH: &str = "/api/v1/cluster/theme";

/// OAuth token endpoint
pub const TOKEN_PATH: &str = "/api/v1/oauth/token";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for a single Portal.
///
/// Cheap to clone. The registration loop still builds a fresh instance per
/// attempt so a wedged connection pool never outlives one try.
#[derive(Clone)]
pub struct PortalClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl PortalClient {
    /// Create a builder for the Portal at `base_url`
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> PortalClientBuilder {
        PortalClientBuilder::new(base_url)
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Register this node, authenticated with the cluster join token.
    ///
    /// Performs exactly one POST. The error variant tells the caller whether
    /// another attempt makes sense, see [`ClusterError::outcome`].
    pub async fn register(
        &self,
        join_token: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse> {
        let url = self.url(REGISTER_PATH);
        debug!(url = %url, node = %request.node_name, "POST register");

        let response = self
            .inner
            .http
            .post(&url)
            .bearer_auth(join_token)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        self.handle_response(response).await
    }

    /// Exchange client credentials for an access token.
    pub async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<AccessToken> {
        let url = self.url(TOKEN_PATH);
        debug!(url = %url, client_id = %client_id, "POST token");

        let response = self
            .inner
            .http
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        self.handle_response(response).await
    }

    /// Download the cluster theme archive.
    ///
    /// Returns `Ok(None)` when the Portal has no theme configured (404).
    /// Bodies larger than `max_bytes` are rejected while streaming.
    pub async fn theme_bundle(&self, access_token: &str, max_bytes: u64) -> Result<Option<Vec<u8>>> {
        let url = self.url(THEME_PATH);
        debug!(url = %url, "GET theme");

        let mut response = self
            .inner
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/zip")
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return self.handle_error(status, response).await;
        }

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(ClusterError::PayloadTooLarge { limit: max_bytes });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_transport(&e))? {
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ClusterError::PayloadTooLarge { limit: max_bytes });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Some(body))
    }

    /// Fetch a JSON Web Key Set from an absolute URL.
    pub async fn jwks(&self, url: &str) -> Result<JwkSet> {
        debug!(url = %url, "GET jwks");

        let response = self
            .inner
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        self.handle_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    fn map_transport(&self, err: &reqwest::Error) -> ClusterError {
        if err.is_timeout() {
            ClusterError::Timeout(self.inner.timeout.as_secs())
        } else if err.is_connect() {
            ClusterError::Connection(err.to_string())
        } else {
            ClusterError::Http(err.to_string())
        }
    }

    /// Handle a response that returns JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status().as_u16();

        if classify(status) == Outcome::Success {
            let body = response.text().await.map_err(|e| self.map_transport(&e))?;
            serde_json::from_str(&body).map_err(ClusterError::Json)
        } else {
            self.handle_error(status, response).await
        }
    }

    /// Convert an error response to a `ClusterError`
    async fn handle_error<T>(&self, status: u16, response: reqwest::Response) -> Result<T> {
        let body = response.text().await.unwrap_or_default();

        // Try to parse error message from JSON
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        if status == 429 {
            warn!("rate limited by portal");
        }

        Err(ClusterError::from_status(status, message))
    }
}

/// Builder for configuring a [`PortalClient`]
pub struct PortalClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
}

impl PortalClientBuilder {
    /// Create a new builder for the Portal at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("halide/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<PortalClient> {
        let parsed = Url::parse(self.base_url.trim())
            .map_err(|e| ClusterError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        if parsed.host_str().is_none() {
            return Err(ClusterError::InvalidUrl(format!(
                "{}: missing host",
                self.base_url
            )));
        }

        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| ClusterError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(PortalClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: parsed.as_str().trim_end_matches('/').to_string(),
                timeout: self.timeout,
            }),
        })
    }
}
