//! The lookup client: verdict cache in front of a cancellable round trip.

use crate::backend::{HttpBackend, ReputationBackend, TransportError};
use crate::cache::{CacheEntry, VerdictCache};
use crate::config::{ClientConfig, FALLBACK_TTL};
use crate::error::{verdict_result, LookupError, ProvisionError};
use crate::metrics;
use crate::proxy::{configure_proxy, DialStrategy};
use crate::verdict::Verdict;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

/// Per-call knobs for [`Client::lookup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Overrides the client's default TTL for the entry this call writes.
    pub ttl: Option<Duration>,
    /// Point in time after which the caller no longer wants an answer.
    pub deadline: Option<Instant>,
}

impl LookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

#[derive(Clone)]
struct Transport {
    dial: DialStrategy,
    backend: Arc<dyn ReputationBackend>,
}

/// Reputation lookup client.
///
/// Lookups take `&self` and may run concurrently; they share one verdict cache.
/// Changing the proxy requires `&mut self` through [`Client::provision`], so it
/// can never overlap an in-flight lookup.
pub struct Client {
    config: ClientConfig,
    default_ttl: Option<Duration>,
    cache: VerdictCache,
    injected: Option<Arc<dyn ReputationBackend>>,
    transport: OnceCell<Transport>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    /// Creates a client. No network resources are built until [`Client::provision`]
    /// or the first lookup that misses the cache.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            default_ttl: None,
            cache: VerdictCache::new(),
            injected: None,
            transport: OnceCell::new(),
        }
    }

    /// Sets the default TTL for new cache entries, taking precedence over
    /// `default_ttl_secs` from the configuration. Zero clears it again.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl).filter(|ttl| !ttl.is_zero());
        self
    }

    /// Sets the proxy URL. Takes effect at the next [`Client::provision`].
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Sets the base URL lookup keys are appended to. Takes effect at the next
    /// [`Client::provision`].
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    /// Replaces the HTTP backend. Provisioning still validates the proxy URL but
    /// keeps this backend.
    pub fn with_backend<B>(mut self, backend: B) -> Self
    where
        B: ReputationBackend + 'static,
    {
        let backend: Arc<dyn ReputationBackend> = Arc::new(backend);
        self.injected = Some(backend.clone());
        self.transport = OnceCell::from(Transport {
            dial: DialStrategy::Direct,
            backend,
        });
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The dialing strategy currently installed, if the transport has been built.
    pub fn dial_strategy(&self) -> Option<&DialStrategy> {
        self.transport.get().map(|t| &t.dial)
    }

    /// Validates the proxy configuration and installs a fresh transport.
    ///
    /// On error the previously installed transport stays active. Calling this
    /// again with unchanged configuration is harmless.
    pub fn provision(&mut self) -> Result<(), ProvisionError> {
        let transport = self.build_transport()?;
        if transport.dial.is_direct() {
            tracing::info!(
                "Provisioned reputation client: endpoint {}, dialing directly",
                self.config.endpoint
            );
        } else {
            tracing::info!(
                "Provisioned reputation client: endpoint {}, dialing through {}",
                self.config.endpoint,
                transport.dial
            );
        }
        self.transport = OnceCell::from(transport);
        Ok(())
    }

    fn build_transport(&self) -> Result<Transport, ProvisionError> {
        let dial = configure_proxy(self.config.proxy.as_deref().unwrap_or_default())?;
        let backend = match &self.injected {
            Some(backend) => backend.clone(),
            None => Arc::new(build_http_backend(&self.config, &dial)?) as Arc<dyn ReputationBackend>,
        };
        Ok(Transport { dial, backend })
    }

    /// TTL applied to the entry written by a lookup with the given override.
    pub fn effective_ttl(&self, override_ttl: Option<Duration>) -> Duration {
        override_ttl
            .or(self.default_ttl)
            .or_else(|| self.config.default_ttl())
            .unwrap_or(FALLBACK_TTL)
    }

    /// Classifies `key`, consulting the cache first.
    ///
    /// Returns `Ok(())` only when the key is clean. `BadReputation` and
    /// `Unclassified` carry the verdict; `DeadlineExceeded` means
    /// `opts.deadline` passed before the backend answered.
    pub async fn lookup(
        &self,
        key: &str,
        user_agent: &str,
        opts: LookupOptions,
    ) -> Result<(), LookupError> {
        self.lookup_with_cancel(key, user_agent, opts, future::pending())
            .await
    }

    /// Like [`Client::lookup`], additionally racing the round trip against
    /// `cancel`. If `cancel` resolves first the lookup returns `Cancelled`.
    pub async fn lookup_with_cancel<C>(
        &self,
        key: &str,
        user_agent: &str,
        opts: LookupOptions,
        cancel: C,
    ) -> Result<(), LookupError>
    where
        C: Future<Output = ()>,
    {
        let ttl = self.effective_ttl(opts.ttl);

        let miss = if self.config.cache_enabled {
            match self.cache.get(key) {
                Some(entry) if entry.is_fresh(Instant::now()) => {
                    tracing::debug!("Cache hit for {}: {}", key, entry.verdict);
                    metrics::LOOKUP_CACHE_HITS_TOTAL.inc();
                    return verdict_result(entry.verdict);
                }
                Some(_) => {
                    tracing::debug!("Cache entry expired for {}", key);
                    "expired"
                }
                None => {
                    tracing::debug!("Cache miss for {}", key);
                    "absent"
                }
            }
        } else {
            tracing::debug!("Caching disabled, querying backend for {}", key);
            "disabled"
        };
        metrics::LOOKUP_CACHE_MISSES_TOTAL.with_label_values(&[miss]).inc();

        let transport = match self
            .transport
            .get_or_try_init(|| async { self.build_transport() })
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!("Cannot look up {}: transport unavailable: {}", key, e);
                return Err(LookupError::Unclassified);
            }
        };

        let round_trip = RoundTrip::spawn(transport.backend.clone(), key, user_agent);
        let deadline = async {
            match opts.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        tokio::pin!(cancel, deadline, round_trip);

        let joined = tokio::select! {
            biased;
            _ = &mut cancel => {
                tracing::debug!("Lookup for {} cancelled before the backend answered", key);
                metrics::LOOKUP_CANCELLATIONS_TOTAL.with_label_values(&["cancelled"]).inc();
                return Err(LookupError::Cancelled);
            }
            _ = &mut deadline => {
                tracing::debug!("Lookup for {} hit its deadline before the backend answered", key);
                metrics::LOOKUP_CANCELLATIONS_TOTAL.with_label_values(&["deadline"]).inc();
                return Err(LookupError::DeadlineExceeded);
            }
            joined = &mut round_trip => joined,
        };

        let verdict = classify(key, joined);
        metrics::LOOKUP_ROUND_TRIPS_TOTAL
            .with_label_values(&[verdict.as_str()])
            .inc();
        self.cache.put(key, CacheEntry::new(verdict, ttl));

        verdict_result(verdict)
    }

    /// Last stored verdict for `key`, expired or not. Never touches the network.
    pub fn last_known_verdict(&self, key: &str) -> Option<Verdict> {
        self.cache.get(key).map(|entry| entry.verdict)
    }

    pub fn cache(&self) -> &VerdictCache {
        &self.cache
    }

    /// Removes expired cache entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired(Instant::now())
    }
}

fn build_http_backend(
    config: &ClientConfig,
    dial: &DialStrategy,
) -> Result<HttpBackend, ProvisionError> {
    // Every lookup closes its connection, so there is nothing worth pooling.
    let mut builder = reqwest::Client::builder().pool_max_idle_per_host(0);
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    let client = dial.apply(builder)?.build()?;
    Ok(HttpBackend::new(client, config.endpoint.clone()))
}

fn classify(
    key: &str,
    joined: Result<Result<u16, TransportError>, JoinError>,
) -> Verdict {
    match joined {
        Ok(Ok(status)) => {
            let verdict = Verdict::from_status(status);
            tracing::debug!("Backend answered {} for {}: {}", status, key, verdict);
            verdict
        }
        Ok(Err(e)) => {
            tracing::warn!("Round trip for {} failed: {}", key, e);
            metrics::LOOKUP_TRANSPORT_FAILURES_TOTAL.inc();
            Verdict::Unknown
        }
        Err(e) => {
            tracing::warn!("Round trip task for {} did not complete: {}", key, e);
            metrics::LOOKUP_TRANSPORT_FAILURES_TOTAL.inc();
            Verdict::Unknown
        }
    }
}

/// A spawned round trip that is aborted when dropped.
///
/// Dropping happens when the lookup loses the race or the caller drops the
/// lookup future itself; either way the task stops at its next await point and
/// never reaches the cache.
struct RoundTrip {
    handle: JoinHandle<Result<u16, TransportError>>,
}

impl RoundTrip {
    fn spawn(backend: Arc<dyn ReputationBackend>, key: &str, user_agent: &str) -> Self {
        let key = key.to_string();
        let user_agent = user_agent.to_string();
        let handle = tokio::spawn(async move { backend.round_trip(&key, &user_agent).await });
        Self { handle }
    }
}

impl Future for RoundTrip {
    type Output = Result<Result<u16, TransportError>, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

impl Drop for RoundTrip {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Periodically drops expired entries from `client`'s cache.
///
/// Lookups never need this; it only bounds memory for long-running processes
/// that see many distinct keys.
pub fn spawn_cache_cleanup_task(client: Arc<Client>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = client.purge_expired();
            tracing::debug!("Purged {} expired reputation cache entries", purged);
        }
    })
}
