//! HTTP transport seam.
//!
//! Everything above this module talks to the network through
//! [`HttpTransport`], so tests can substitute a scripted transport and count
//! calls. [`ReqwestTransport`] is the pooled keep-alive production client and
//! [`TransportRegistry`] owns one per connection identity.

mod registry;
mod reqwest_transport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LinkError, Result};

pub use registry::{TransportKey, TransportRegistry};
pub use reqwest_transport::{ProxySettings, ReqwestTransport, ReqwestTransportBuilder};

/// An outbound request, owned so the retry engine can resubmit it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-attempt timeout; filled in by the retry engine.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Attach an already-encoded protobuf body.
    pub fn protobuf(mut self, body: Vec<u8>) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/x-protobuf"));
        self.body = Some(Bytes::from(body));
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// URL without its query string, safe for logs (presigned URLs carry secrets).
    pub fn redacted_url(&self) -> &str {
        redact_url(&self.url)
    }
}

pub(crate) fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Server-directed retry delay in whole seconds.
    ///
    /// Accepts both the delta-seconds and the HTTP-date forms; dates in the
    /// past yield zero. Unparseable values count as absent.
    pub fn retry_after_secs(&self) -> Option<u64> {
        let raw = self.headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(secs) = raw.parse::<u64>() {
            return Some(secs);
        }
        let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
        let delta = at.signed_duration_since(Utc::now()).num_seconds();
        Some(delta.max(0) as u64)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            LinkError::Serialization(format!("Failed to parse response body: {}", e))
        })
    }
}

/// Why a request produced no response at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    Connect,
    Timeout,
    Io,
}

/// I/O failure before a status line was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportFailureKind::Connect => "connect",
            TransportFailureKind::Timeout => "timeout",
            TransportFailureKind::Io => "io",
        };
        write!(f, "{} failure: {}", kind, self.message)
    }
}

/// Sends one HTTP request and buffers the response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportFailure>;
}
