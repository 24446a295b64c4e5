//! In-memory trust and value set gateways.

use std::sync::{Mutex, PoisonError};

use hcert_trustlist::{
    ids, SupplementalSource, TrustGateway, TrustListEntry, ValueSet, ValueSetEntry,
    ValueSetGateway, ValueSets,
};

use crate::keystore::signing_context;

/// Trust gateway serving whatever entries the test put in.
#[derive(Debug, Default)]
pub struct MemoryTrustGateway {
    entries: Mutex<Vec<TrustListEntry>>,
}

impl MemoryTrustGateway {
    /// An empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway publishing the keys named by the given test key names.
    #[must_use]
    pub fn with_keys(key_names: &[&str]) -> Self {
        let gateway = Self::new();
        gateway.set_keys(key_names);
        gateway
    }

    /// Replace the published list wholesale.
    pub fn set_entries(&self, entries: Vec<TrustListEntry>) {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Replace the published list with the named test keys.
    pub fn set_keys(&self, key_names: &[&str]) {
        let entries = key_names
            .iter()
            .map(|name| {
                let ctx = signing_context(name);
                TrustListEntry {
                    kid: ctx.key_identifier().to_string(),
                    country: "GB".into(),
                    public_key: ctx.public_key_sec1(),
                }
            })
            .collect();
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries;
    }
}

impl TrustGateway for MemoryTrustGateway {
    async fn trust_list(&self) -> anyhow::Result<Vec<TrustListEntry>> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Value set gateway serving a fixed collection.
#[derive(Clone, Debug)]
pub struct StaticValueSets(pub ValueSets);

impl Default for StaticValueSets {
    fn default() -> Self {
        Self(default_value_sets())
    }
}

impl ValueSetGateway for StaticValueSets {
    async fn value_sets(&self) -> anyhow::Result<ValueSets> {
        Ok(self.0.clone())
    }
}

/// Supplemental source serving a fixed collection (empty by default).
#[derive(Clone, Debug, Default)]
pub struct StaticSupplemental(pub ValueSets);

impl SupplementalSource for StaticSupplemental {
    async fn supplemental(&self) -> anyhow::Result<ValueSets> {
        Ok(self.0.clone())
    }
}

/// The value sets the test authority publishes: the codes the sample
/// records use, plus an inactive product to exercise rejection.
#[must_use]
pub fn default_value_sets() -> ValueSets {
    let mut sets = ValueSets::new();

    let mut disease = ValueSet::new();
    disease.insert("840539006", ValueSetEntry { display: "COVID-19".into(), active: true });
    sets.insert(ids::DISEASE_AGENT_TARGETED, disease);

    let mut products = ValueSet::new();
    products.insert(
        "EU/1/20/1507",
        ValueSetEntry { display: "Spikevax".into(), active: true },
    );
    products.insert(
        "EU/1/20/1528",
        ValueSetEntry { display: "Comirnaty".into(), active: true },
    );
    products.insert(
        "EU/1/20/1525",
        ValueSetEntry { display: "Withdrawn product".into(), active: false },
    );
    sets.insert(ids::VACCINE_PRODUCT, products);

    let mut holders = ValueSet::new();
    holders.insert(
        "ORG-100031184",
        ValueSetEntry { display: "Moderna Biotech".into(), active: true },
    );
    holders.insert(
        "ORG-100030215",
        ValueSetEntry { display: "BioNTech Manufacturing".into(), active: true },
    );
    sets.insert(ids::VACCINE_MAH, holders);

    let mut prophylaxis = ValueSet::new();
    prophylaxis.insert(
        "1119349007",
        ValueSetEntry { display: "SARS-CoV-2 mRNA vaccine".into(), active: true },
    );
    sets.insert(ids::VACCINE_PROPHYLAXIS, prophylaxis);

    let mut test_types = ValueSet::new();
    test_types.insert(
        "LP6464-4",
        ValueSetEntry { display: "Nucleic acid amplification".into(), active: true },
    );
    test_types.insert(
        "LP217198-3",
        ValueSetEntry { display: "Rapid immunoassay".into(), active: true },
    );
    sets.insert(ids::TEST_TYPE, test_types);

    let mut results = ValueSet::new();
    results.insert("260415000", ValueSetEntry { display: "Not detected".into(), active: true });
    results.insert("260373001", ValueSetEntry { display: "Detected".into(), active: true });
    sets.insert(ids::TEST_RESULT, results);

    sets
}
