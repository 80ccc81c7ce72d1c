//! Access tokens for managed cloud services
//!
//! Supports both static and dynamic credentials:
//! - Static: token set once at creation (local development)
//! - Dynamic: provider called before each request (metadata server, refresh)
//!
//! # Example
//!
//! ```ignore
//! let tokens = TokenSource::dynamic(token_provider(|| async {
//!     let token = fetch_fresh_token().await?;
//!     Ok(token)
//! }));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::core::{EngineError, EngineResult};

/// Metadata server endpoint for the runtime's service account token
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Type alias for the boxed future returned by token providers
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = EngineResult<String>> + Send + 'a>>;

/// Trait for providing access tokens dynamically
///
/// Called before each API request. Implementations should handle caching
/// and refresh internally.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> TokenFuture<'_>;
}

/// Wrapper to implement TokenProvider for async closures
pub struct FnTokenProvider<F> {
    func: F,
}

impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<String>> + Send + 'static,
{
    fn token(&self) -> TokenFuture<'_> {
        Box::pin((self.func)())
    }
}

/// Create a token provider from an async closure
pub fn token_provider<F, Fut>(func: F) -> FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = EngineResult<String>> + Send + 'static,
{
    FnTokenProvider { func }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Fetches tokens from the metadata server of the managed runtime
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataTokenProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> EngineResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        tracing::debug!("Fetching access token from metadata server");
        let response: MetadataToken = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some((response.access_token.clone(), Instant::now() + lifetime));
        Ok(response.access_token)
    }
}

impl Default for MetadataTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for MetadataTokenProvider {
    fn token(&self) -> TokenFuture<'_> {
        Box::pin(self.fetch())
    }
}

/// Where credentials come from
#[derive(Clone)]
pub enum TokenSource {
    /// Token set at creation time
    Static(String),
    /// Token from a provider
    Dynamic(Arc<dyn TokenProvider>),
}

impl TokenSource {
    /// Static token if configured, otherwise the metadata server
    pub fn from_config(config: &EngineConfig) -> Self {
        match &config.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Dynamic(Arc::new(MetadataTokenProvider::new())),
        }
    }

    pub fn dynamic<P: TokenProvider + 'static>(provider: P) -> Self {
        TokenSource::Dynamic(Arc::new(provider))
    }

    /// Get a bearer token (either returns static or calls provider)
    pub async fn bearer(&self) -> EngineResult<String> {
        let token = match self {
            TokenSource::Static(token) => token.clone(),
            TokenSource::Dynamic(provider) => provider.token().await?,
        };
        if token.is_empty() {
            return Err(EngineError::InvalidConfig("empty access token".into()));
        }
        Ok(token)
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("TokenSource::Static(<redacted>)"),
            TokenSource::Dynamic(_) => f.write_str("TokenSource::Dynamic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static("abc".into());
        assert_eq!(source.bearer().await.unwrap(), "abc");
        assert_eq!(format!("{:?}", source), "TokenSource::Static(<redacted>)");
    }

    #[tokio::test]
    async fn test_dynamic_token() {
        let source = TokenSource::dynamic(token_provider(|| async { Ok("fresh".to_string()) }));
        assert_eq!(source.bearer().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let source = TokenSource::Static(String::new());
        assert!(matches!(
            source.bearer().await.unwrap_err(),
            EngineError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_from_config() {
        let mut config = EngineConfig::new("p");
        assert!(matches!(TokenSource::from_config(&config), TokenSource::Dynamic(_)));

        config.access_token = Some("t".into());
        assert!(matches!(TokenSource::from_config(&config), TokenSource::Static(_)));
    }
}
