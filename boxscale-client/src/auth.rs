//! Compute plane credentials
//!
//! Tokens come from one of two endpoints:
//! - [`MetadataServer`]: default credentials of the machine the controller
//!   runs on
//! - [`ServiceAccount`]: a service-account key file; each token is minted by
//!   exchanging a signed JWT assertion at the key's token URI
//!
//! [`CachedTokenSource`] wraps either endpoint and fetches a fresh token
//! shortly before the current one expires.

use async_trait::async_trait;
use boxscale_core::dto::compute::{AccessToken, ServiceAccountKey};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::normalize_base_url;

/// Default metadata server endpoint
pub const METADATA_URL: &str = "http://metadata.google.internal";

/// OAuth scope requested for service-account tokens
pub const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion, in seconds
const ASSERTION_LIFETIME: u64 = 3600;

/// Refresh this long before a token expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of `Authorization` header values for the compute plane
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a full header value, e.g. `Bearer ya29...`
    async fn authorization(&self) -> Result<String>;
}

/// Issuer of fresh access tokens
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken>;
}

// =============================================================================
// Caching
// =============================================================================

/// Last header value handed out and the instant it stops being usable
#[derive(Debug, Default)]
struct TokenCache {
    current: Option<(String, Instant)>,
}

impl TokenCache {
    /// Cached value, unless it expires within the margin
    fn get(&self, now: Instant) -> Option<&str> {
        match &self.current {
            Some((value, expires_at)) if now + EXPIRY_MARGIN < *expires_at => Some(value.as_str()),
            _ => None,
        }
    }

    /// Stores a token; one without `expires_in` is never reused
    fn put(&mut self, token: &AccessToken, now: Instant) -> String {
        let value = format!("{} {}", token.token_type, token.access_token);
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(0));
        self.current = Some((value.clone(), now + lifetime));
        value
    }
}

/// Token source that reuses tokens until shortly before they expire
pub struct CachedTokenSource<E> {
    endpoint: E,
    cache: Mutex<TokenCache>,
}

impl<E: TokenEndpoint> CachedTokenSource<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            cache: Mutex::new(TokenCache::default()),
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }
}

#[async_trait]
impl<E: TokenEndpoint> TokenSource for CachedTokenSource<E> {
    async fn authorization(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(value) = cache.get(Instant::now()) {
            return Ok(value.to_string());
        }

        let token = self.endpoint.fetch().await?;
        debug!("Fetched compute token (expires in {:?}s)", token.expires_in);

        Ok(cache.put(&token, Instant::now()))
    }
}

// =============================================================================
// Metadata server
// =============================================================================

/// Default credentials from the instance metadata server
pub struct MetadataServer {
    base_url: String,
    client: Client,
}

impl MetadataServer {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(METADATA_URL, client)
    }

    /// Point at a different metadata endpoint
    pub fn with_base_url(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            client,
        }
    }
}

#[async_trait]
impl TokenEndpoint for MetadataServer {
    async fn fetch(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ClientError::Credentials(format!("metadata server unreachable: {}", e)))?;

        crate::handle_response(response)
            .await
            .map_err(|e| ClientError::Credentials(e.to_string()))
    }
}

// =============================================================================
// Service account key
// =============================================================================

/// Claims of the JWT bearer assertion
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Service account loaded from a key file
pub struct ServiceAccount {
    client_email: String,
    token_uri: String,
    key_id: Option<String>,
    key: EncodingKey,
    client: Client,
}

// Needed by `Result::unwrap_err` in tests; never prints key material
#[cfg(test)]
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Load a service-account key file (e.g. `creds.json`)
    pub async fn load(path: impl AsRef<Path>, client: Client) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClientError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            ClientError::Credentials(format!(
                "invalid service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_key(key, client)
    }

    /// Build from an already decoded key
    pub fn from_key(key: ServiceAccountKey, client: Client) -> Result<Self> {
        if key.key_type != "service_account" {
            return Err(ClientError::Credentials(format!(
                "expected a service_account key, found type {:?}",
                key.key_type
            )));
        }

        if key.client_email.trim().is_empty() {
            return Err(ClientError::Credentials(
                "service account key has no client_email".to_string(),
            ));
        }

        let encoding = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ClientError::Credentials(format!("invalid service account private key: {}", e))
        })?;

        Ok(Self {
            client_email: key.client_email,
            token_uri: key.token_uri,
            key_id: key.private_key_id,
            key: encoding,
            client,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Signed assertion valid for one hour from `issued_at` (Unix seconds)
    fn assertion(&self, issued_at: u64) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: COMPUTE_SCOPE,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        encode(&header, &claims, &self.key)
            .map_err(|e| ClientError::Credentials(format!("failed to sign token request: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for ServiceAccount {
    async fn fetch(&self) -> Result<AccessToken> {
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::Credentials(format!("system clock before epoch: {}", e)))?
            .as_secs();
        let assertion = self.assertion(issued_at)?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ClientError::Credentials(format!("token endpoint unreachable: {}", e)))?;

        crate::handle_response(response)
            .await
            .map_err(|e| ClientError::Credentials(e.to_string()))
    }
}
