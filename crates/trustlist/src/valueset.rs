//! # Value Sets
//!
//! Recognized clinical codes and their validity, merged from two sources: an
//! external trust authority (primary) and a locally curated override
//! document (supplemental). Supplemental entries augment the primary set and
//! win on conflict, but can never remove a primary entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::trust::RefreshError;

/// Identifiers of the value sets the pipelines consult.
pub mod ids {
    /// Disease agent targeted.
    pub const DISEASE_AGENT_TARGETED: &str = "disease-agent-targeted";

    /// Authorized vaccine products.
    pub const VACCINE_PRODUCT: &str = "vaccines-covid-19-names";

    /// Marketing authorization holders.
    pub const VACCINE_MAH: &str = "vaccines-covid-19-auth-holders";

    /// Vaccine or prophylaxis classification.
    pub const VACCINE_PROPHYLAXIS: &str = "sct-vaccines-covid-19";

    /// Test types.
    pub const TEST_TYPE: &str = "covid-19-lab-test-type";

    /// Test results.
    pub const TEST_RESULT: &str = "covid-19-lab-result";
}

/// One recognized code.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueSetEntry {
    /// Human-readable label.
    pub display: String,

    /// Whether the code is currently valid for issuance/verification.
    pub active: bool,
}

/// A code system's recognized codes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueSet {
    entries: HashMap<String, ValueSetEntry>,
}

impl ValueSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a code.
    pub fn insert(&mut self, code: impl Into<String>, entry: ValueSetEntry) {
        self.entries.insert(code.into(), entry);
    }

    /// Look up a code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&ValueSetEntry> {
        self.entries.get(code)
    }

    /// `true` when the code is present and active.
    #[must_use]
    pub fn is_active(&self, code: &str) -> bool {
        self.get(code).is_some_and(|e| e.active)
    }

    /// Number of codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the set has no codes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Overlay another set: its entries are added, replacing on conflict.
    fn overlay(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }
}

/// All value sets, keyed by set identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueSets {
    sets: HashMap<String, ValueSet>,
}

impl ValueSets {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole set.
    pub fn insert(&mut self, id: impl Into<String>, set: ValueSet) {
        self.sets.insert(id.into(), set);
    }

    /// Look up a set.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ValueSet> {
        self.sets.get(id)
    }

    /// `true` when `code` is present and active in the set named `id`.
    ///
    /// A missing set means the code cannot be recognized.
    #[must_use]
    pub fn is_active(&self, id: &str, code: &str) -> bool {
        self.get(id).is_some_and(|s| s.is_active(code))
    }

    /// Merge a supplemental collection into this (primary) one.
    ///
    /// Supplemental codes are added to their sets, replacing primary codes
    /// on conflict; sets unknown to the primary are added whole. Nothing is
    /// ever removed.
    #[must_use]
    pub fn merged_with(mut self, supplemental: Self) -> Self {
        for (id, set) in supplemental.sets {
            match self.sets.get_mut(&id) {
                Some(existing) => existing.overlay(set),
                None => {
                    self.sets.insert(id, set);
                }
            }
        }
        self
    }
}

/// External value set authority (primary source). Consumed read-only.
pub trait ValueSetGateway: Send + Sync {
    /// Fetch the authority's current value sets.
    fn value_sets(&self) -> impl Future<Output = anyhow::Result<ValueSets>> + Send;
}

/// Locally curated supplemental document (secondary source).
pub trait SupplementalSource: Send + Sync {
    /// Fetch the supplemental value sets.
    fn supplemental(&self) -> impl Future<Output = anyhow::Result<ValueSets>> + Send;
}

/// An immutable merged value set snapshot.
#[derive(Debug)]
pub struct ValueSetSnapshot {
    merged: ValueSets,
    updated_at: DateTime<Utc>,
}

impl ValueSetSnapshot {
    fn empty() -> Self {
        Self { merged: ValueSets::new(), updated_at: DateTime::UNIX_EPOCH }
    }

    /// The merged sets.
    #[must_use]
    pub const fn sets(&self) -> &ValueSets {
        &self.merged
    }

    /// When this snapshot was built.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Shared, refreshable merged value sets.
///
/// Same lifecycle as the trust cache: replace-on-refresh, readers never
/// blocked, concurrent refresh triggers coalesced, failures leave the prior
/// snapshot standing.
pub struct ValueSetCache {
    snapshot: RwLock<Arc<ValueSetSnapshot>>,
    refreshing: Mutex<()>,
    fetch_timeout: Duration,
}

impl ValueSetCache {
    /// An empty cache with the default fetch bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(crate::trust::DEFAULT_FETCH_TIMEOUT)
    }

    /// An empty cache with an explicit fetch bound.
    #[must_use]
    pub fn with_timeout(fetch_timeout: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(ValueSetSnapshot::empty())),
            refreshing: Mutex::new(()),
            fetch_timeout,
        }
    }

    /// The current merged snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ValueSetSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Fetch both sources, merge, and swap in a fresh snapshot.
    ///
    /// Returns `Ok(false)` when another refresh was already in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] when either source fails or times out; the
    /// existing snapshot stays in place.
    pub async fn refresh(
        &self, gateway: &impl ValueSetGateway, supplemental: &impl SupplementalSource,
    ) -> Result<bool, RefreshError> {
        let Ok(_guard) = self.refreshing.try_lock() else {
            return Ok(false);
        };

        let primary = tokio::time::timeout(self.fetch_timeout, gateway.value_sets())
            .await
            .map_err(|_| RefreshError::Timeout(self.fetch_timeout))?
            .map_err(|e| RefreshError::Origin(e.to_string()))?;
        let overrides = tokio::time::timeout(self.fetch_timeout, supplemental.supplemental())
            .await
            .map_err(|_| RefreshError::Timeout(self.fetch_timeout))?
            .map_err(|e| RefreshError::Origin(e.to_string()))?;

        let fresh = Arc::new(ValueSetSnapshot {
            merged: primary.merged_with(overrides),
            updated_at: Utc::now(),
        });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(true)
    }
}

impl Default for ValueSetCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(codes: &[(&str, &str, bool)]) -> ValueSet {
        let mut s = ValueSet::new();
        for (code, display, active) in codes {
            s.insert(*code, ValueSetEntry { display: (*display).into(), active: *active });
        }
        s
    }

    #[test]
    fn supplemental_augments_and_wins_on_conflict() {
        let mut primary = ValueSets::new();
        primary.insert(
            ids::VACCINE_PRODUCT,
            set(&[("EU/1/20/1507", "Spikevax", true), ("EU/1/20/1528", "Comirnaty", true)]),
        );

        let mut supplemental = ValueSets::new();
        supplemental.insert(
            ids::VACCINE_PRODUCT,
            // Conflicting entry flips the flag; a new code is added.
            set(&[("EU/1/20/1528", "Comirnaty", false), ("EU/1/21/1529", "Vaxzevria", true)]),
        );
        supplemental.insert(ids::TEST_RESULT, set(&[("260415000", "Not detected", true)]));

        let merged = primary.merged_with(supplemental);

        let products = merged.get(ids::VACCINE_PRODUCT).expect("set present");
        assert_eq!(products.len(), 3, "nothing removed, one added");
        assert!(products.is_active("EU/1/20/1507"), "untouched primary entry survives");
        assert!(!products.is_active("EU/1/20/1528"), "override wins on conflict");
        assert!(products.is_active("EU/1/21/1529"), "supplemental-only entry added");
        assert!(merged.is_active(ids::TEST_RESULT, "260415000"), "supplemental-only set added");
    }

    #[test]
    fn missing_set_means_unrecognized() {
        let sets = ValueSets::new();
        assert!(!sets.is_active(ids::DISEASE_AGENT_TARGETED, "840539006"));
    }

    struct StaticGateway(ValueSets);
    impl ValueSetGateway for StaticGateway {
        async fn value_sets(&self) -> anyhow::Result<ValueSets> {
            Ok(self.0.clone())
        }
    }

    struct StaticSupplemental(ValueSets);
    impl SupplementalSource for StaticSupplemental {
        async fn supplemental(&self) -> anyhow::Result<ValueSets> {
            Ok(self.0.clone())
        }
    }

    struct FailingGateway;
    impl ValueSetGateway for FailingGateway {
        async fn value_sets(&self) -> anyhow::Result<ValueSets> {
            anyhow::bail!("blob store unavailable")
        }
    }

    #[tokio::test]
    async fn refresh_merges_and_failures_keep_prior() {
        let mut primary = ValueSets::new();
        primary.insert(ids::DISEASE_AGENT_TARGETED, set(&[("840539006", "COVID-19", true)]));
        let mut supplemental = ValueSets::new();
        supplemental.insert(ids::DISEASE_AGENT_TARGETED, set(&[("840544004", "Suspected", true)]));

        let cache = ValueSetCache::new();
        assert!(cache
            .refresh(&StaticGateway(primary), &StaticSupplemental(supplemental))
            .await
            .expect("should refresh"));

        let snapshot = cache.snapshot();
        assert!(snapshot.sets().is_active(ids::DISEASE_AGENT_TARGETED, "840539006"));
        assert!(snapshot.sets().is_active(ids::DISEASE_AGENT_TARGETED, "840544004"));

        let err = cache
            .refresh(&FailingGateway, &StaticSupplemental(ValueSets::new()))
            .await
            .expect_err("origin down");
        assert!(matches!(err, RefreshError::Origin(_)));
        assert!(
            cache.snapshot().sets().is_active(ids::DISEASE_AGENT_TARGETED, "840539006"),
            "stale snapshot survives a failed refresh"
        );
    }
}
