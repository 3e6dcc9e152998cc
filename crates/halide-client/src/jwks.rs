//! In-memory cache of the Portal's token signing keys.

use halide_core::{Jwk, JwkSet, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use crate::PortalClient;

/// Cache of the Portal's published signing keys.
///
/// Primed once after a successful registration so that tokens issued by the
/// Portal can be verified without a round trip on the first request.
#[derive(Clone, Default)]
pub struct JwksCache {
    inner: Arc<RwLock<Cached>>,
}

#[derive(Default)]
struct Cached {
    url: Option<String>,
    keys: JwkSet,
}

impl JwksCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the key set at `url` and replace the cached keys.
    ///
    /// Returns the number of keys now cached.
    pub async fn prime(&self, url: &Url, timeout: Duration) -> Result<usize> {
        let origin = url.origin().ascii_serialization();
        let client = PortalClient::builder(origin).timeout(timeout).build()?;
        let keys = client.jwks(url.as_str()).await?;
        let count = keys.keys.len();

        let mut cached = self.inner.write().await;
        cached.url = Some(url.to_string());
        cached.keys = keys;

        info!(url = %url, keys = count, "primed portal key cache");
        Ok(count)
    }

    /// Look up a cached key by ID
    pub async fn key(&self, kid: &str) -> Option<Jwk> {
        self.inner.read().await.keys.find(kid).cloned()
    }

    /// Number of cached keys
    pub async fn len(&self) -> usize {
        self.inner.read().await.keys.keys.len()
    }

    /// Returns true if nothing has been cached yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// URL the keys were loaded from
    pub async fn source(&self) -> Option<String> {
        self.inner.read().await.url.clone()
    }
}
