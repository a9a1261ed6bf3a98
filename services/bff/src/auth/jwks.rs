//! Signing-key-set cache fed from the identity provider's JWKS endpoint.
//!
//! # Purpose
//! Keeps a fresh kid → public-key mapping in memory so token verification
//! never blocks on the IdP in the common case. Unknown kids (key rotation)
//! trigger at most one throttled refetch; the throttle is what stops a
//! flood of bogus kids from becoming a request flood against the IdP.
//!
//! # Lifecycle
//! [`KeySetCache::connect`] performs a synchronous initial fetch and fails
//! startup if the IdP is unreachable; afterwards a background task refreshes
//! the set on the configured interval and `refresh()` serves throttled
//! on-demand refreshes. [`KeySetCache::close`] stops the background task and
//! marks the cache unhealthy.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, watch};

/// Forced refreshes closer together than this are silently coalesced.
const MIN_REFRESH_INTERVAL_FLOOR: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KeySetConfig {
    /// IdP JWKS endpoint serving the JSON key-set document.
    pub url: String,
    /// Cadence of the scheduled background refresh.
    pub refresh_interval: Duration,
    /// Minimum spacing between on-demand refreshes. Values below the 10 s
    /// floor are raised to it.
    pub min_refresh_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("key set fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
}

pub struct KeySetCache {
    http: reqwest::Client,
    url: String,
    min_refresh_interval: Duration,
    keys: RwLock<JwkSet>,
    last_refresh: Mutex<Instant>,
    healthy: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl KeySetCache {
    /// Fetch the initial key set and start the scheduled refresh task.
    ///
    /// A failed initial fetch is fatal: serving requests without key
    /// material would turn every token into an opaque 401.
    pub async fn connect(config: KeySetConfig) -> Result<Arc<Self>, KeySetError> {
        let http = reqwest::Client::new();
        let initial = fetch_key_set(&http, &config.url).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let cache = Arc::new(Self {
            http,
            url: config.url,
            min_refresh_interval: config.min_refresh_interval.max(MIN_REFRESH_INTERVAL_FLOOR),
            keys: RwLock::new(initial),
            last_refresh: Mutex::new(Instant::now()),
            healthy: AtomicBool::new(true),
            shutdown,
        });
        cache.spawn_scheduled_refresh(config.refresh_interval, shutdown_rx);
        Ok(cache)
    }

    /// Look up a signing key by kid. A miss performs one throttled refresh
    /// and retries the lookup; a post-refresh miss is terminal.
    pub async fn get(&self, kid: &str) -> Result<Jwk, KeySetError> {
        if let Some(key) = self.lookup(kid) {
            self.healthy.store(true, Ordering::Relaxed);
            return Ok(key);
        }

        // Unknown kid: the IdP may have rotated keys since the last fetch.
        if self.refresh().await.is_ok() {
            if let Some(key) = self.lookup(kid) {
                return Ok(key);
            }
        }
        Err(KeySetError::KeyNotFound(kid.to_string()))
    }

    /// Force a refresh, coalesced within the minimum-interval window.
    /// Throttled calls return success without touching the network.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        let mut last = self.last_refresh.lock().await;
        if last.elapsed() < self.min_refresh_interval {
            return Ok(());
        }
        self.fetch_into_cache().await?;
        *last = Instant::now();
        Ok(())
    }

    /// Last-operation health: true after a successful fetch or lookup,
    /// false after a fetch failure or `close()`.
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn key_count(&self) -> usize {
        self.keys.read().expect("key set lock poisoned").keys.len()
    }

    /// Stop the background refresh task and mark the cache unhealthy.
    pub fn close(&self) {
        self.healthy.store(false, Ordering::Relaxed);
        let _ = self.shutdown.send(true);
    }

    fn lookup(&self, kid: &str) -> Option<Jwk> {
        self.keys
            .read()
            .expect("key set lock poisoned")
            .keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid))
            .cloned()
    }

    async fn fetch_into_cache(&self) -> Result<(), KeySetError> {
        match fetch_key_set(&self.http, &self.url).await {
            Ok(set) => {
                metrics::gauge!("bff_key_set_keys").set(set.keys.len() as f64);
                metrics::gauge!("bff_key_set_healthy").set(1.0);
                *self.keys.write().expect("key set lock poisoned") = set;
                self.healthy.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                metrics::gauge!("bff_key_set_healthy").set(0.0);
                self.healthy.store(false, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn spawn_scheduled_refresh(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the startup fetch covered it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        tracing::debug!("key set refresh task stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        let mut last = cache.last_refresh.lock().await;
                        match cache.fetch_into_cache().await {
                            Ok(()) => *last = Instant::now(),
                            Err(err) => {
                                tracing::warn!(error = %err, "scheduled key set refresh failed");
                            }
                        }
                    }
                }
            }
        });
    }
}

async fn fetch_key_set(http: &reqwest::Client, url: &str) -> Result<JwkSet, KeySetError> {
    let set = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<JwkSet>()
        .await?;
    Ok(set)
}
