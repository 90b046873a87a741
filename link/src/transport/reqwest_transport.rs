use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportFailure, TransportFailureKind};
use crate::error::{LinkError, Result};
use crate::timeouts::LinkTimeouts;

const USER_AGENT: &str = concat!("warehouse-link/", env!("CARGO_PKG_VERSION"));

/// Outbound proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Pooled keep-alive HTTP(S) client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::new()
    }

    fn map_error(err: reqwest::Error) -> TransportFailure {
        let kind = if err.is_timeout() {
            TransportFailureKind::Timeout
        } else if err.is_connect() {
            TransportFailureKind::Connect
        } else {
            TransportFailureKind::Io
        };
        TransportFailure::new(kind, err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(Self::map_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(Self::map_error)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransportBuilder {
    connect_timeout: Duration,
    request_timeout: Duration,
    idle_timeout: Duration,
    max_idle_per_host: usize,
    proxy: Option<ProxySettings>,
}

impl ReqwestTransportBuilder {
    fn new() -> Self {
        let timeouts = LinkTimeouts::default();
        Self {
            connect_timeout: timeouts.connection_timeout,
            request_timeout: timeouts.request_timeout,
            idle_timeout: timeouts.idle_connection_timeout,
            max_idle_per_host: 10,
            proxy: None,
        }
    }

    /// Apply connection, request and idle timeouts in one go.
    pub fn timeouts(mut self, timeouts: &LinkTimeouts) -> Self {
        self.connect_timeout = timeouts.connection_timeout;
        self.request_timeout = timeouts.request_timeout;
        self.idle_timeout = timeouts.idle_connection_timeout;
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxySettings>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        // Keep idle connections around so consecutive polls and chunk
        // downloads skip the TCP/TLS handshake.
        let mut client_builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .tcp_keepalive(Duration::from_secs(60));

        client_builder = match &self.proxy {
            Some(settings) => {
                debug!("[LINK_HTTP] Using proxy {}", super::redact_url(&settings.url));
                let mut proxy = reqwest::Proxy::all(&settings.url)
                    .map_err(|e| LinkError::Configuration(format!("Invalid proxy url: {}", e)))?;
                if let Some(username) = &settings.username {
                    proxy = proxy.basic_auth(username, settings.password.as_deref().unwrap_or(""));
                }
                client_builder.proxy(proxy)
            },
            None => client_builder,
        };

        let client = client_builder
            .build()
            .map_err(|e| LinkError::Configuration(e.to_string()))?;
        Ok(ReqwestTransport { client })
    }
}
