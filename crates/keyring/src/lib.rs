//! # Key Ring
//!
//! Holds signing keys per issuer, caching a loaded [`SigningContext`] for
//! each configured key. Key material comes from an external secret store
//! behind the [`KeyStore`] trait; the ring derives the short key identifier
//! by hashing the public key material — it never trusts an identifier
//! supplied from outside during signing.
//!
//! Creating a context can be costly (a secret-store round trip plus key
//! parsing), so the get-or-create path is single-flight per cache key:
//! concurrent signs for the same issuer share one fetch, while signs for
//! different issuers never serialize against each other.

mod context;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

pub use crate::context::{
    derive_key_id, encode_key_id, verify, SigningContext, KEY_ID_LEN,
};

/// Default bound on a single secret-store fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Key ring failures.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// No signing key is configured under the requested identifier.
    #[error("no signing key configured for '{0}'")]
    KeyNotFound(String),

    /// Key material exists but cannot be used.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The signing operation itself failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The secret store did not answer within the configured bound.
    #[error("key store fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The secret store reported a failure.
    #[error("key store failure: {0}")]
    Store(String),
}

/// External secret store abstraction.
///
/// Implementations own their transport, authentication, and retry policy;
/// the ring additionally bounds each call with its fetch timeout so no
/// signing request can hang on a slow store.
pub trait KeyStore: Send + Sync {
    /// Fetch the raw P-256 secret scalar stored under `key_name`.
    ///
    /// `Ok(None)` means no key is configured under that name.
    fn signing_key(
        &self, key_name: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send;
}

/// Keyed cache of signing contexts.
pub struct KeyRing<S: KeyStore> {
    store: S,
    fetch_timeout: Duration,
    contexts: RwLock<HashMap<String, Arc<SigningContext>>>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyStore> KeyRing<S> {
    /// Create a ring over the given secret store.
    pub fn new(store: S) -> Self {
        Self::with_timeout(store, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a ring with an explicit fetch bound.
    pub fn with_timeout(store: S, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
            contexts: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached signing context for `key_name`, creating it on first
    /// use.
    ///
    /// The creation path runs at most once concurrently per key: a per-key
    /// gate serializes creators while the shared cache map lock is never
    /// held across the store fetch.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::KeyNotFound`] when the store has no key under
    /// that name, [`KeyringError::Timeout`] when the fetch exceeds the
    /// configured bound, and [`KeyringError::InvalidKey`]/
    /// [`KeyringError::Store`] for unusable material or store failures.
    pub async fn context(&self, key_name: &str) -> Result<Arc<SigningContext>, KeyringError> {
        if let Some(ctx) = self.cached(key_name) {
            return Ok(ctx);
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            gates.entry(key_name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _creating = gate.lock().await;

        // Another creator may have finished while this one waited.
        if let Some(ctx) = self.cached(key_name) {
            return Ok(ctx);
        }

        let fetched = tokio::time::timeout(self.fetch_timeout, self.store.signing_key(key_name))
            .await
            .map_err(|_| KeyringError::Timeout(self.fetch_timeout))?
            .map_err(|e| KeyringError::Store(e.to_string()))?
            .ok_or_else(|| KeyringError::KeyNotFound(key_name.to_string()))?;

        let ctx = Arc::new(SigningContext::from_secret_bytes(&fetched)?);
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_name.to_string(), Arc::clone(&ctx));
        Ok(ctx)
    }

    /// The textual key identifier for `key_name`.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::context`] failures.
    pub async fn key_identifier(&self, key_name: &str) -> Result<String, KeyringError> {
        Ok(self.context(key_name).await?.key_identifier().to_string())
    }

    /// Sign `payload` with the key configured under `key_name`.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::context`] failures and [`KeyringError::Signing`].
    pub async fn sign(&self, key_name: &str, payload: &[u8]) -> Result<Vec<u8>, KeyringError> {
        self.context(key_name).await?.sign(payload)
    }

    fn cached(&self, key_name: &str) -> Option<Arc<SigningContext>> {
        self.contexts.read().unwrap_or_else(PoisonError::into_inner).get(key_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const SECRET: &str = "6c1382765aec5358f117733d281c1c7bdc39884d04a45a1e6c67c858bc206c19";

    #[derive(Clone)]
    struct CountingStore {
        fetches: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl CountingStore {
        fn new(delay: Duration) -> Self {
            Self { fetches: Arc::new(AtomicUsize::new(0)), delay }
        }
    }

    impl KeyStore for CountingStore {
        async fn signing_key(&self, key_name: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if key_name == "missing" {
                return Ok(None);
            }
            Ok(Some(hex::decode(SECRET).expect("valid hex")))
        }
    }

    #[tokio::test]
    async fn caches_context_after_first_fetch() {
        let store = CountingStore::new(Duration::ZERO);
        let fetches = Arc::clone(&store.fetches);
        let ring = KeyRing::new(store);

        let a = ring.context("key-1").await.expect("should load");
        let b = ring.context("key-1").await.expect("should hit cache");
        assert_eq!(a.key_identifier(), b.key_identifier());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_creators_share_one_fetch() {
        let store = CountingStore::new(Duration::from_millis(20));
        let fetches = Arc::clone(&store.fetches);
        let ring = Arc::new(KeyRing::new(store));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ring = Arc::clone(&ring);
            handles.push(tokio::spawn(async move {
                ring.sign("key-1", b"payload").await.expect("should sign")
            }));
        }
        let mut signatures = Vec::new();
        for handle in handles {
            signatures.push(handle.await.expect("task completes"));
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        // Deterministic ES256: every concurrent sign over the same payload
        // with the same key yields identical bytes.
        assert!(signatures.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn unknown_key_surfaces_not_found() {
        let ring = KeyRing::new(CountingStore::new(Duration::ZERO));
        let err = ring.context("missing").await.expect_err("should fail");
        assert!(matches!(err, KeyringError::KeyNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let ring = KeyRing::with_timeout(
            CountingStore::new(Duration::from_millis(200)),
            Duration::from_millis(10),
        );
        let err = ring.context("key-1").await.expect_err("should time out");
        assert!(matches!(err, KeyringError::Timeout(_)));
    }

    #[tokio::test]
    async fn identifier_matches_context_fingerprint() {
        let ring = KeyRing::new(CountingStore::new(Duration::ZERO));
        let id = ring.key_identifier("key-1").await.expect("should derive");
        let ctx = ring.context("key-1").await.expect("cached");
        assert_eq!(id, ctx.key_identifier());
    }
}
