//! Explicit registry of pooled transports, owned by the driver.
//!
//! Connections lease a transport by identity; leased transports are never
//! evicted. A background task drops transports that nobody leases and that
//! have been idle longer than the configured timeout. The task only takes the
//! registry's own mutex, while requests go through their leased `Arc`, so
//! eviction never blocks an in-flight request.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::HttpTransport;
use crate::error::{LinkError, Result};

/// Connection identity a transport is shared under (host + compute).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey(String);

impl TransportKey {
    pub fn new(host: &str, compute_id: &str) -> Self {
        Self(format!("{}|{}", host.trim_end_matches('/'), compute_id))
    }
}

impl fmt::Display for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Entry {
    transport: Arc<dyn HttpTransport>,
    last_used: Instant,
    /// Leases handed out and not yet released.
    leases: usize,
}

struct RegistryInner {
    entries: Mutex<HashMap<TransportKey, Entry>>,
    idle_timeout: Duration,
}

impl RegistryInner {
    fn evict_idle(&self, now: Instant) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, entry| {
            let leased = Arc::strong_count(&entry.transport) > 1;
            let idle = now.saturating_duration_since(entry.last_used);
            let keep = leased || idle < self.idle_timeout;
            if !keep {
                debug!("[LINK_POOL] Evicting idle transport {} (idle {:?})", key, idle);
            }
            keep
        });
        before - entries.len()
    }
}

/// Registry of transports keyed by connection identity.
pub struct TransportRegistry {
    inner: Arc<RegistryInner>,
    shutdown: CancellationToken,
}

impl TransportRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                idle_timeout,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Lease the transport for `key`, creating it with `create` on first use.
    pub fn lease<F>(&self, key: &TransportKey, create: F) -> Result<Arc<dyn HttpTransport>>
    where
        F: FnOnce() -> Result<Arc<dyn HttpTransport>>,
    {
        let mut entries = self
            .inner
            .entries
            .lock()
            .map_err(|_| LinkError::Configuration("transport registry poisoned".into()))?;
        if let Some(entry) = entries.get_mut(key) {
            entry.last_used = Instant::now();
            entry.leases += 1;
            return Ok(Arc::clone(&entry.transport));
        }

        let transport = create()?;
        debug!("[LINK_POOL] Created transport {}", key);
        entries.insert(
            key.clone(),
            Entry {
                transport: Arc::clone(&transport),
                last_used: Instant::now(),
                leases: 1,
            },
        );
        Ok(transport)
    }

    /// Give back one lease of `key`. The entry is removed when that was the
    /// last lease; returns whether it was.
    pub fn release(&self, key: &TransportKey) -> bool {
        let Ok(mut entries) = self.inner.entries.lock() else {
            return false;
        };
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        entry.leases = entry.leases.saturating_sub(1);
        if entry.leases > 0 {
            debug!("[LINK_POOL] Transport {} still has {} lease(s)", key, entry.leases);
            return false;
        }
        entries.remove(key);
        true
    }

    /// Drop unleased transports idle for at least the idle timeout.
    pub fn evict_idle(&self) -> usize {
        self.inner.evict_idle(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the background eviction task on the current tokio runtime.
    ///
    /// Runs every half idle timeout until [`shutdown`](Self::shutdown) or drop.
    pub fn start_eviction(&self) {
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let shutdown = self.shutdown.clone();
        let period = (self.inner.idle_timeout / 2).max(Duration::from_millis(100));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let evicted = inner.evict_idle(Instant::now());
                        if evicted > 0 {
                            debug!("[LINK_POOL] Evicted {} idle transport(s)", evicted);
                        }
                    }
                }
            }
        });
    }

    /// Stop the eviction task and forget every transport.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Ok(mut entries) = self.inner.entries.lock() {
            if !entries.is_empty() {
                info!("[LINK_POOL] Releasing {} transport(s)", entries.len());
            }
            entries.clear();
        }
    }
}

impl Drop for TransportRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpRequest, HttpResponse, TransportFailure};
    use async_trait::async_trait;
    use reqwest::StatusCode;

    struct NoopTransport;

    #[async_trait]
    impl HttpTransport for NoopTransport {
        async fn send(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportFailure> {
            Ok(HttpResponse::new(StatusCode::OK, ""))
        }
    }

    fn noop() -> Result<Arc<dyn HttpTransport>> {
        Ok(Arc::new(NoopTransport))
    }

    #[test]
    fn test_lease_reuses_transport_per_key() {
        let registry = TransportRegistry::new(Duration::from_secs(60));
        let key = TransportKey::new("https://host.example.com/", "wh1");

        let first = registry.lease(&key, noop).unwrap();
        let second = registry
            .lease(&key, || panic!("transport must be reused"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        let other = TransportKey::new("https://host.example.com", "wh2");
        registry.lease(&other, noop).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_removes_entry_after_last_lease() {
        let registry = TransportRegistry::new(Duration::from_secs(60));
        let key = TransportKey::new("https://host", "wh");
        let first = registry.lease(&key, noop).unwrap();
        let second = registry
            .lease(&key, || panic!("transport must be reused"))
            .unwrap();

        assert!(!registry.release(&key));
        assert_eq!(registry.len(), 1);
        let third = registry
            .lease(&key, || panic!("entry must survive a partial release"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &third));

        assert!(!registry.release(&key));
        assert!(registry.release(&key));
        assert!(registry.is_empty());
        assert!(!registry.release(&key));
        drop((first, second, third));
    }

    #[test]
    fn test_leased_transport_is_not_evicted() {
        let registry = TransportRegistry::new(Duration::ZERO);
        let key = TransportKey::new("https://host", "wh");
        let lease = registry.lease(&key, noop).unwrap();

        assert_eq!(registry.evict_idle(), 0);
        assert_eq!(registry.len(), 1);

        drop(lease);
        assert_eq!(registry.evict_idle(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_recently_used_transport_survives_eviction() {
        let registry = TransportRegistry::new(Duration::from_secs(3600));
        let key = TransportKey::new("https://host", "wh");
        drop(registry.lease(&key, noop).unwrap());

        assert_eq!(registry.evict_idle(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shutdown_clears_registry() {
        let registry = TransportRegistry::new(Duration::from_secs(60));
        let key = TransportKey::new("https://host", "wh");
        let lease = registry.lease(&key, noop).unwrap();
        registry.shutdown();
        assert!(registry.is_empty());
        // Outstanding lease keeps working after teardown.
        assert_eq!(Arc::strong_count(&lease), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_eviction_task() {
        let registry = TransportRegistry::new(Duration::ZERO);
        let key = TransportKey::new("https://host", "wh");
        drop(registry.lease(&key, noop).unwrap());

        registry.start_eviction();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(registry.is_empty());
        registry.shutdown();
    }
}
