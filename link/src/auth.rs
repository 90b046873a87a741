//! Credential providers.
//!
//! Every protocol call asks its [`CredentialProvider`] for the current request
//! headers right before sending, so token refresh is entirely the provider's
//! business. Presigned chunk URLs are fetched without these headers.
//!
//! ```rust,no_run
//! use warehouse_link::{CredentialProvider, StaticCredentials};
//! use reqwest::header::HeaderMap;
//!
//! struct VaultTokens { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl CredentialProvider for VaultTokens {
//!     async fn headers(&self) -> warehouse_link::Result<HeaderMap> {
//!         // fetch / refresh a token here
//!         StaticCredentials::bearer("fresh-token").to_headers()
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::{LinkError, Result};

/// Supplies authentication headers for outbound protocol calls.
///
/// Implementations may perform network calls (token refresh). Any error they
/// return is surfaced as [`LinkError::Authentication`] and is never retried.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn headers(&self) -> Result<HeaderMap>;
}

/// A shared, dynamically dispatched [`CredentialProvider`].
pub type ArcCredentialProvider = Arc<dyn CredentialProvider>;

/// Credentials fixed at construction time.
#[derive(Debug, Clone)]
pub enum StaticCredentials {
    /// Personal access token or any other bearer token.
    Bearer(String),

    /// HTTP Basic Auth (username, password)
    Basic(String, String),

    /// No authentication headers
    None,
}

impl StaticCredentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// Encodes username:password as base64 for the `Authorization: Basic`
    /// header following RFC 7617.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic(username.into(), password.into())
    }

    pub fn none() -> Self {
        Self::None
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Render the `Authorization` header for these credentials.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let value = match self {
            Self::Bearer(token) => format!("Bearer {}", token),
            Self::Basic(username, password) => {
                let credentials = format!("{}:{}", username, password);
                format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()))
            },
            Self::None => return Ok(headers),
        };
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            LinkError::Authentication("credentials contain invalid header characters".into())
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn headers(&self) -> Result<HeaderMap> {
        self.to_headers()
    }
}

/// Ask `provider` for headers, folding any failure into an authentication error.
pub(crate) async fn resolve_headers(provider: &dyn CredentialProvider) -> Result<HeaderMap> {
    match provider.headers().await {
        Ok(headers) => Ok(headers),
        Err(LinkError::Authentication(message)) => Err(LinkError::Authentication(message)),
        Err(other) => Err(LinkError::Authentication(other.to_string())),
    }
}
