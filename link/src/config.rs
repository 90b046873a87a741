//! Connection configuration.
//!
//! Loaded once when a [`WarehouseClient`](crate::WarehouseClient) is built,
//! either in code through the `with_*` methods or from a flat key/value map
//! (connection-string style) through [`ConnectionConfig::from_map`].

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::models::{Backend, ComputeRef};
use crate::retry::{BackoffPolicy, RetryBudget};
use crate::timeouts::LinkTimeouts;
use crate::transport::ProxySettings;

const SESSION_PREFIX: &str = "session.";

/// Everything one logical connection needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Base URL of the workspace, e.g. `https://adb-123.azuredatabricks.net`.
    pub host: String,
    pub compute: ComputeRef,
    pub backend: Backend,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    /// Server-side session configuration.
    pub session_conf: BTreeMap<String, String>,
    pub retry: RetryBudget,
    pub backoff: BackoffPolicy,
    pub timeouts: LinkTimeouts,
    pub max_idle_connections_per_host: usize,
    pub proxy: Option<ProxySettings>,
    /// Ask for columnar result chunks instead of JSON arrays.
    pub use_columnar: bool,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, compute: ComputeRef) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            compute,
            backend: Backend::default(),
            catalog: None,
            schema: None,
            session_conf: BTreeMap::new(),
            retry: RetryBudget::default(),
            backoff: BackoffPolicy::default(),
            timeouts: LinkTimeouts::default(),
            max_idle_connections_per_host: 10,
            proxy: None,
            use_columnar: true,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_session_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_conf.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryBudget) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_columnar(mut self, use_columnar: bool) -> Self {
        self.use_columnar = use_columnar;
        self
    }

    pub fn with_max_idle_connections_per_host(mut self, max: usize) -> Self {
        self.max_idle_connections_per_host = max;
        self
    }

    /// Parse a flat key/value map. Every key also accepts a JDBC-style alias.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let host = get_str(map, "host", "Host")
            .ok_or_else(|| LinkError::Configuration("host is required".into()))?;
        let warehouse_id = get_str(map, "warehouse_id", "WarehouseId");
        let cluster_id = get_str(map, "cluster_id", "ClusterId");
        let compute = match (warehouse_id, cluster_id) {
            (Some(id), None) => ComputeRef::Warehouse(id),
            (None, Some(id)) => ComputeRef::Cluster(id),
            (Some(_), Some(_)) => {
                return Err(LinkError::Configuration(
                    "warehouse_id and cluster_id are mutually exclusive".into(),
                ))
            },
            (None, None) => {
                return Err(LinkError::Configuration(
                    "one of warehouse_id or cluster_id is required".into(),
                ))
            },
        };

        let mut config = Self::new(host, compute);

        if let Some(value) = get_str(map, "backend", "Backend") {
            config.backend = value.parse()?;
        }
        config.catalog = get_str(map, "catalog", "ConnCatalog");
        config.schema = get_str(map, "schema", "ConnSchema");

        if let Some(value) = get_str(map, "max_attempts", "MaxRetries") {
            config.retry.max_attempts = parse_u32(&value, "max_attempts")?;
        }
        if let Some(value) = get_str(map, "retry_temp_unavailable", "TemporarilyUnavailableRetry") {
            config.retry.retry_temp_unavailable = parse_bool(&value, "retry_temp_unavailable")?;
        }
        if let Some(value) =
            get_str(map, "temp_unavailable_timeout_secs", "TemporarilyUnavailableRetryTimeout")
        {
            config.retry.temp_unavailable_timeout_secs =
                parse_u64(&value, "temp_unavailable_timeout_secs")?;
        }
        if let Some(value) = get_str(map, "retry_rate_limit", "RateLimitRetry") {
            config.retry.retry_rate_limit = parse_bool(&value, "retry_rate_limit")?;
        }
        if let Some(value) = get_str(map, "rate_limit_timeout_secs", "RateLimitRetryTimeout") {
            config.retry.rate_limit_timeout_secs = parse_u64(&value, "rate_limit_timeout_secs")?;
        }

        if let Some(value) = get_str(map, "min_backoff_secs", "RetryWaitMin") {
            config.backoff.min_backoff = parse_secs(&value, "min_backoff_secs")?;
        }
        if let Some(value) = get_str(map, "max_backoff_secs", "RetryWaitMax") {
            config.backoff.max_backoff = parse_secs(&value, "max_backoff_secs")?;
        }
        if let Some(value) = get_str(map, "backoff_factor", "RetryBackoffFactor") {
            config.backoff.factor = value.trim().parse::<f64>().map_err(|_| invalid("backoff_factor", &value))?;
        }

        if let Some(value) = get_str(map, "poll_interval_ms", "AsyncExecPollInterval") {
            config.timeouts.poll_interval = parse_ms(&value, "poll_interval_ms")?;
        }
        if let Some(value) = get_str(map, "wait_timeout_secs", "DirectResultsWaitTimeout") {
            config.timeouts.wait_timeout = parse_secs(&value, "wait_timeout_secs")?;
        }
        if let Some(value) = get_str(map, "connect_timeout_secs", "ConnectTimeout") {
            config.timeouts.connection_timeout = parse_secs(&value, "connect_timeout_secs")?;
        }
        if let Some(value) = get_str(map, "request_timeout_secs", "SocketTimeout") {
            config.timeouts.request_timeout = parse_secs(&value, "request_timeout_secs")?;
        }
        if let Some(value) = get_str(map, "overall_timeout_secs", "QueryTimeout") {
            config.timeouts.overall_timeout = parse_secs(&value, "overall_timeout_secs")?;
        }
        if let Some(value) = get_str(map, "idle_connection_timeout_secs", "IdleConnectionTimeout") {
            config.timeouts.idle_connection_timeout =
                parse_secs(&value, "idle_connection_timeout_secs")?;
        }
        if let Some(value) =
            get_str(map, "max_idle_connections_per_host", "MaxIdleConnectionsPerHost")
        {
            config.max_idle_connections_per_host =
                parse_u32(&value, "max_idle_connections_per_host")? as usize;
        }

        if let Some(url) = get_str(map, "proxy_url", "ProxyUrl") {
            config.proxy = Some(ProxySettings {
                url,
                username: get_str(map, "proxy_username", "ProxyUID"),
                password: get_str(map, "proxy_password", "ProxyPWD"),
            });
        }
        if let Some(value) = get_str(map, "use_columnar", "EnableArrow") {
            config.use_columnar = parse_bool(&value, "use_columnar")?;
        }

        for (key, value) in map {
            if let Some(name) = key.strip_prefix(SESSION_PREFIX) {
                if !name.is_empty() {
                    config.session_conf.insert(name.to_string(), value.clone());
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check ranges the server or the retry engine would otherwise reject late.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(LinkError::Configuration("host must not be empty".into()));
        }
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(LinkError::Configuration(format!(
                "host must start with http:// or https://: {}",
                self.host
            )));
        }
        if self.compute.id().is_empty() {
            return Err(LinkError::Configuration("compute id must not be empty".into()));
        }
        let wait = self.timeouts.wait_timeout.as_secs();
        if wait != 0 && !(5..=50).contains(&wait) {
            return Err(LinkError::Configuration(format!(
                "wait_timeout_secs must be 0 or between 5 and 50, got {}",
                wait
            )));
        }
        if !(self.backoff.factor.is_finite() && self.backoff.factor >= 1.0) {
            return Err(LinkError::Configuration(format!(
                "backoff_factor must be a finite number >= 1, got {}",
                self.backoff.factor
            )));
        }
        if self.backoff.min_backoff > self.backoff.max_backoff {
            return Err(LinkError::Configuration(
                "min_backoff_secs must not exceed max_backoff_secs".into(),
            ));
        }
        if self.timeouts.poll_interval.is_zero() {
            return Err(LinkError::Configuration("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Look up `key`, then `alias` (case-insensitively).
fn get_str(map: &HashMap<String, String>, key: &str, alias: &str) -> Option<String> {
    map.get(key)
        .or_else(|| {
            map.iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(alias))
                .map(|(_, value)| value)
        })
        .map(|value| value.trim().to_string())
}

fn invalid(field: &str, value: &str) -> LinkError {
    LinkError::Configuration(format!("Invalid {} value: {}", field, value))
}

fn parse_bool(value: &str, field: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(invalid(field, value)),
    }
}

fn parse_u32(value: &str, field: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| invalid(field, value))
}

fn parse_u64(value: &str, field: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| invalid(field, value))
}

fn parse_secs(value: &str, field: &str) -> Result<Duration> {
    parse_u64(value, field).map(Duration::from_secs)
}

fn parse_ms(value: &str, field: &str) -> Result<Duration> {
    parse_u64(value, field).map(Duration::from_millis)
}
