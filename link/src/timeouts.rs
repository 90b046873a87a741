//! Timeout configuration for warehouse-link operations.
//!
//! Centralizes every wait the driver performs: connection setup, individual
//! HTTP requests, the caller's overall budget for one logical request, the
//! server-side synchronous wait on submission and the poll cadence.

use std::time::Duration;

/// Timeout configuration for warehouse-link operations.
///
/// # Examples
///
/// ```rust
/// use warehouse_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults suit most warehouses
/// let timeouts = LinkTimeouts::default();
///
/// // Long-running analytics with a hard ceiling per request
/// let timeouts = LinkTimeouts::builder()
///     .request_timeout(Duration::from_secs(300))
///     .overall_timeout(Duration::from_secs(3600))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for a single HTTP exchange.
    /// Default: 60 seconds
    pub request_timeout: Duration,

    /// Caller's budget for one logical request including all of its retries.
    /// Zero means unbounded (retry budgets still apply).
    /// Default: 0
    pub overall_timeout: Duration,

    /// How long the REST backend may hold a submission open waiting for the
    /// statement to finish. Zero makes submission fully asynchronous.
    /// Default: 10 seconds
    pub wait_timeout: Duration,

    /// Delay between status polls after the first one.
    /// Default: 200 milliseconds
    pub poll_interval: Duration,

    /// Pooled connections idle for longer than this are evicted.
    /// Default: 90 seconds
    pub idle_connection_timeout: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            overall_timeout: Duration::ZERO,
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            idle_connection_timeout: Duration::from_secs(90),
        }
    }
}

impl LinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Short timeouts for a warehouse on the local network.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(15),
            overall_timeout: Duration::from_secs(120),
            wait_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            idle_connection_timeout: Duration::from_secs(30),
        }
    }

    /// Long timeouts for cross-region or heavily loaded warehouses.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
            overall_timeout: Duration::ZERO,
            wait_timeout: Duration::from_secs(50),
            poll_interval: Duration::from_secs(1),
            idle_connection_timeout: Duration::from_secs(300),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }

    /// Overall budget as an `Option`, `None` meaning unbounded.
    pub fn overall_budget(&self) -> Option<Duration> {
        if Self::is_no_timeout(self.overall_timeout) {
            None
        } else {
            Some(self.overall_timeout)
        }
    }
}

/// Builder for creating custom [`LinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the per-request timeout in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set the overall budget per logical request. Zero disables it.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.overall_timeout = timeout;
        self
    }

    /// Set the overall budget in seconds. Zero disables it.
    pub fn overall_timeout_secs(self, secs: u64) -> Self {
        self.overall_timeout(Duration::from_secs(secs))
    }

    /// Set the server-side synchronous wait for submissions.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.wait_timeout = timeout;
        self
    }

    /// Set the server-side synchronous wait in seconds.
    pub fn wait_timeout_secs(self, secs: u64) -> Self {
        self.wait_timeout(Duration::from_secs(secs))
    }

    /// Set the delay between status polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.timeouts.poll_interval = interval;
        self
    }

    /// Set the delay between status polls in milliseconds.
    pub fn poll_interval_ms(self, ms: u64) -> Self {
        self.poll_interval(Duration::from_millis(ms))
    }

    /// Set how long pooled connections may stay idle.
    pub fn idle_connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.idle_connection_timeout = timeout;
        self
    }

    /// Set how long pooled connections may stay idle, in seconds.
    pub fn idle_connection_timeout_secs(self, secs: u64) -> Self {
        self.idle_connection_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = LinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.poll_interval, Duration::from_millis(200));
        assert!(timeouts.overall_budget().is_none());
    }

    #[test]
    fn test_builder() {
        let timeouts = LinkTimeouts::builder()
            .connection_timeout_secs(60)
            .overall_timeout_secs(600)
            .poll_interval_ms(50)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.overall_budget(), Some(Duration::from_secs(600)));
        assert_eq!(timeouts.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_fast_preset() {
        let timeouts = LinkTimeouts::fast();
        assert!(timeouts.connection_timeout <= Duration::from_secs(5));
        assert!(timeouts.overall_budget().is_some());
    }

    #[test]
    fn test_relaxed_preset() {
        let timeouts = LinkTimeouts::relaxed();
        assert!(timeouts.request_timeout >= Duration::from_secs(120));
        assert!(timeouts.wait_timeout <= Duration::from_secs(50));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(LinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!LinkTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(LinkTimeouts::is_no_timeout(Duration::from_secs(86400 * 366)));
    }
}
