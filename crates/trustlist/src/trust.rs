//! # Trust List Cache
//!
//! Trusted public keys addressable by their short key identifier. The cache
//! holds one immutable snapshot at a time: a refresh builds a complete
//! replacement and swaps it in atomically, so readers always see either the
//! fully-old or the fully-new list — never a mix. A failed refresh leaves
//! the prior snapshot in place; stale-but-available beats unavailable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Default bound on one trust-origin fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry as published by the trust origin.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrustListEntry {
    /// Textual key identifier (truncated fingerprint, base64).
    pub kid: String,

    /// Country attribution.
    pub country: String,

    /// SEC1-encoded public key point.
    pub public_key: Vec<u8>,
}

/// A trusted public key resolved from a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedKey {
    /// SEC1-encoded public key point.
    pub public_key: Vec<u8>,

    /// Country attribution.
    pub country: String,
}

/// An immutable trust list snapshot.
#[derive(Debug)]
pub struct TrustListSnapshot {
    keys: HashMap<String, TrustedKey>,
    updated_at: DateTime<Utc>,
}

impl TrustListSnapshot {
    /// The empty snapshot a cache starts from at cold start.
    #[must_use]
    pub fn empty() -> Self {
        Self { keys: HashMap::new(), updated_at: DateTime::UNIX_EPOCH }
    }

    /// Build a snapshot from origin entries.
    #[must_use]
    pub fn from_entries(entries: Vec<TrustListEntry>, updated_at: DateTime<Utc>) -> Self {
        let keys = entries
            .into_iter()
            .map(|e| (e.kid, TrustedKey { public_key: e.public_key, country: e.country }))
            .collect();
        Self { keys, updated_at }
    }

    /// Resolve a key identifier. The identifier is purely a lookup key;
    /// trust comes from membership in this snapshot.
    #[must_use]
    pub fn public_key(&self, kid: &str) -> Option<&TrustedKey> {
        self.keys.get(kid)
    }

    /// When this snapshot was built.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of trusted keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// `true` when no keys are trusted (cold start, before first refresh).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// External trust origin abstraction. Consumed read-only.
pub trait TrustGateway: Send + Sync {
    /// Fetch the complete current trust list.
    fn trust_list(&self) -> impl Future<Output = anyhow::Result<Vec<TrustListEntry>>> + Send;
}

/// Refresh failures. The cached snapshot is never affected.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The origin could not be reached or returned an error.
    #[error("trust origin unreachable: {0}")]
    Origin(String),

    /// The origin did not answer within the configured bound.
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),
}

/// Shared, refreshable trust list.
///
/// Readers never block on a refresh and a refresh never blocks readers:
/// lookups clone an `Arc` to the current snapshot under a briefly-held read
/// lock, and the swap takes the write lock only for the pointer exchange.
/// At most one refresh runs at a time; concurrent triggers coalesce.
pub struct TrustCache {
    snapshot: RwLock<Arc<TrustListSnapshot>>,
    refreshing: Mutex<()>,
    fetch_timeout: Duration,
}

impl TrustCache {
    /// An empty cache with the default fetch bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// An empty cache with an explicit fetch bound.
    #[must_use]
    pub fn with_timeout(fetch_timeout: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(TrustListSnapshot::empty())),
            refreshing: Mutex::new(()),
            fetch_timeout,
        }
    }

    /// The current snapshot.
    ///
    /// Hold the returned `Arc` for the duration of one verification so every
    /// lookup within it sees a single consistent list.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrustListSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolve a key identifier against the current snapshot.
    #[must_use]
    pub fn public_key(&self, kid: &str) -> Option<TrustedKey> {
        self.snapshot().public_key(kid).cloned()
    }

    /// Fetch the origin and swap in a fresh snapshot.
    ///
    /// Returns `Ok(true)` when a new snapshot was installed and `Ok(false)`
    /// when another refresh was already in flight (this trigger coalesced
    /// into it). Safe to call concurrently with lookups; no lock is held
    /// across the origin fetch except the single-refresh gate.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] when the origin fails or times out. The
    /// existing snapshot stays in place.
    pub async fn refresh(&self, gateway: &impl TrustGateway) -> Result<bool, RefreshError> {
        let Ok(_guard) = self.refreshing.try_lock() else {
            return Ok(false);
        };

        let entries = tokio::time::timeout(self.fetch_timeout, gateway.trust_list())
            .await
            .map_err(|_| RefreshError::Timeout(self.fetch_timeout))?
            .map_err(|e| RefreshError::Origin(e.to_string()))?;

        let fresh = Arc::new(TrustListSnapshot::from_entries(entries, Utc::now()));
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(true)
    }

    /// When the current snapshot was built. `UNIX_EPOCH` before the first
    /// successful refresh.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.snapshot().updated_at()
    }
}

impl Default for TrustCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    struct FlippingGateway {
        flip: AtomicBool,
        fetches: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
    }

    impl FlippingGateway {
        fn new(delay: Duration) -> Self {
            Self {
                flip: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                delay,
                fail: AtomicBool::new(false),
            }
        }

        fn entries(prefix: &str) -> Vec<TrustListEntry> {
            vec![
                TrustListEntry {
                    kid: format!("{prefix}-1"),
                    country: "GB".into(),
                    public_key: vec![4, 1, 2],
                },
                TrustListEntry {
                    kid: format!("{prefix}-2"),
                    country: "GB".into(),
                    public_key: vec![4, 3, 4],
                },
            ]
        }
    }

    impl TrustGateway for FlippingGateway {
        async fn trust_list(&self) -> anyhow::Result<Vec<TrustListEntry>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("origin unreachable");
            }
            let flipped = self.flip.fetch_xor(true, Ordering::SeqCst);
            Ok(Self::entries(if flipped { "b" } else { "a" }))
        }
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot_wholesale() {
        let gateway = FlippingGateway::new(Duration::ZERO);
        let cache = TrustCache::new();
        assert!(cache.snapshot().is_empty());

        assert!(cache.refresh(&gateway).await.expect("should refresh"));
        assert!(cache.public_key("a-1").is_some());
        assert!(cache.public_key("a-2").is_some());

        assert!(cache.refresh(&gateway).await.expect("should refresh"));
        assert!(cache.public_key("b-1").is_some());
        assert!(cache.public_key("a-1").is_none(), "old entries do not linger");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_snapshot() {
        let gateway = FlippingGateway::new(Duration::ZERO);
        let cache = TrustCache::new();
        cache.refresh(&gateway).await.expect("first refresh");
        let before = cache.last_updated();

        gateway.fail.store(true, Ordering::SeqCst);
        let err = cache.refresh(&gateway).await.expect_err("origin down");
        assert!(matches!(err, RefreshError::Origin(_)));

        // Stale beats unavailable.
        assert!(cache.public_key("a-1").is_some());
        assert_eq!(cache.last_updated(), before);
    }

    #[tokio::test]
    async fn concurrent_refreshes_coalesce() {
        let gateway = Arc::new(FlippingGateway::new(Duration::from_millis(30)));
        let cache = Arc::new(TrustCache::new());

        let first = {
            let (cache, gateway) = (Arc::clone(&cache), Arc::clone(&gateway));
            tokio::spawn(async move { cache.refresh(gateway.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.refresh(gateway.as_ref()).await.expect("should coalesce");

        assert!(!second, "second trigger is a no-op");
        assert!(first.await.expect("task completes").expect("should refresh"));
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_origin_times_out_without_clearing() {
        let gateway = FlippingGateway::new(Duration::from_millis(100));
        let cache = TrustCache::with_timeout(Duration::from_millis(5));

        let err = cache.refresh(&gateway).await.expect_err("should time out");
        assert!(matches!(err, RefreshError::Timeout(_)));
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test]
    async fn readers_always_observe_one_consistent_snapshot() {
        let gateway = Arc::new(FlippingGateway::new(Duration::ZERO));
        let cache = Arc::new(TrustCache::new());
        cache.refresh(gateway.as_ref()).await.expect("seed");

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = cache.snapshot();
                    let a = snapshot.public_key("a-1").is_some()
                        && snapshot.public_key("a-2").is_some();
                    let b = snapshot.public_key("b-1").is_some()
                        && snapshot.public_key("b-2").is_some();
                    // Entries of one generation always travel together.
                    assert!(a ^ b, "snapshot mixed two generations");
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..50 {
            cache.refresh(gateway.as_ref()).await.expect("should refresh");
            tokio::task::yield_now().await;
        }
        reader.await.expect("reader saw consistent snapshots");
    }
}
