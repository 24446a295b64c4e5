//! In-memory identifier store with atomic check-and-insert.

use std::collections::{HashMap, HashSet};

use hcert_uvci::{InsertOutcome, Scenario, StoreError, UvciRecord, UvciStore};
use tokio::sync::Mutex;

/// Identifier store backed by process memory.
///
/// The whole check-and-insert sequence runs under one lock, mirroring the
/// atomic upsert a real store performs.
#[derive(Debug, Default)]
pub struct MemoryUvciStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    identifiers: HashSet<String>,
    by_user: HashMap<(String, Scenario), String>,
    records: Vec<UvciRecord>,
}

impl MemoryUvciStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an identifier string, forcing collisions in tests.
    pub async fn seed_identifier(&self, uvci: &str) {
        self.inner.lock().await.identifiers.insert(uvci.to_string());
    }

    /// Number of persisted records.
    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Copy of every persisted record.
    pub async fn records(&self) -> Vec<UvciRecord> {
        self.inner.lock().await.records.clone()
    }
}

impl UvciStore for MemoryUvciStore {
    async fn existing_for_user(
        &self, user_hash: &str, scenario: Scenario,
    ) -> anyhow::Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.by_user.get(&(user_hash.to_string(), scenario)).cloned())
    }

    async fn insert(&self, record: &UvciRecord) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let user_key = (record.user_hash.clone(), record.certificate_scenario);
        if let Some(existing) = inner.by_user.get(&user_key) {
            return Ok(InsertOutcome::AlreadyIssued(existing.clone()));
        }
        if !inner.identifiers.insert(record.uvci.clone()) {
            return Err(StoreError::DuplicateIdentifier);
        }
        inner.by_user.insert(user_key, record.uvci.clone());
        inner.records.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
}
