//! # Unique Certificate Identifier
//!
//! Composes globally unique, checksummed certificate identifiers per issuing
//! authority and persists them before they are handed to a caller. The
//! format is stable and parses back into its components for audit:
//!
//! ```text
//! URN:UVCI:01:{country}:{institution}/{kind tag}/{suffix}#{check}
//! ```
//!
//! Persistence goes through [`UvciStore`], whose insert is atomic at the
//! store: a duplicate identifier string is a distinguishable conflict that
//! the generator answers with a fresh suffix (bounded retries), while an
//! identifier already issued to the same user and scenario is returned
//! as-is rather than re-inserted.

pub mod luhn;

use std::future::Future;

use chrono::{DateTime, Utc};
use hcert_core::gen;
use hcert_schema::CertificateKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// URN namespace every identifier opens with.
pub const URN_PREFIX: &str = "URN:UVCI:";

/// Identifier schema version.
pub const UVCI_VERSION: &str = "01";

/// Length of the random suffix component.
pub const SUFFIX_LEN: usize = 12;

/// Attempts before identifier generation gives up.
pub const MAX_ATTEMPTS: usize = 3;

/// The issuance scenario an identifier belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Scenario {
    /// Domestic-use certificate.
    Domestic,

    /// International travel certificate.
    International,
}

/// Identifier failures.
#[derive(Debug, Error)]
pub enum UvciError {
    /// Every attempt collided with an existing identifier.
    #[error("identifier generation exhausted after {0} attempts")]
    Exhausted(usize),

    /// The persistent store failed.
    #[error("identifier store failure: {0}")]
    Store(String),

    /// A string does not parse as an identifier.
    #[error("malformed identifier: {0}")]
    Malformed(String),
}

/// A parsed identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uvci {
    /// ISO 3166 country code.
    pub country: String,

    /// Issuing institution code.
    pub institution: String,

    /// Certificate kind.
    pub kind: CertificateKind,

    /// Random suffix component.
    pub suffix: String,

    /// Luhn mod-36 check character over the body.
    pub checksum: char,
}

impl Uvci {
    /// Compose an identifier from its components, deriving the check
    /// character.
    #[must_use]
    pub fn compose(
        country: impl Into<String>, institution: impl Into<String>, kind: CertificateKind,
        suffix: impl Into<String>,
    ) -> Self {
        let country = country.into();
        let institution = institution.into();
        let suffix = suffix.into();
        let checksum = luhn::checksum(&Self::body(&country, &institution, kind, &suffix));
        Self { country, institution, kind, suffix, checksum }
    }

    /// Parse an identifier back into its components, validating the check
    /// character.
    ///
    /// # Errors
    ///
    /// Returns [`UvciError::Malformed`] for structural faults and check
    /// mismatches.
    pub fn parse(input: &str) -> Result<Self, UvciError> {
        let malformed = |what: &str| UvciError::Malformed(format!("{what} in '{input}'"));

        let rest = input.strip_prefix(URN_PREFIX).ok_or_else(|| malformed("missing URN prefix"))?;
        let (body, check) =
            rest.rsplit_once('#').ok_or_else(|| malformed("missing check character"))?;
        let mut check_chars = check.chars();
        let checksum = check_chars.next().ok_or_else(|| malformed("missing check character"))?;
        if check_chars.next().is_some() {
            return Err(malformed("check component is more than one character"));
        }

        let mut colon_parts = body.splitn(3, ':');
        let version = colon_parts.next().ok_or_else(|| malformed("missing version"))?;
        if version != UVCI_VERSION {
            return Err(malformed("unsupported identifier version"));
        }
        let country = colon_parts.next().ok_or_else(|| malformed("missing country"))?;
        let tail = colon_parts.next().ok_or_else(|| malformed("missing issuer component"))?;

        let mut slash_parts = tail.splitn(3, '/');
        let institution = slash_parts.next().ok_or_else(|| malformed("missing institution"))?;
        let tag = slash_parts.next().ok_or_else(|| malformed("missing kind tag"))?;
        let suffix = slash_parts.next().ok_or_else(|| malformed("missing suffix"))?;

        let mut tag_chars = tag.chars();
        let kind = tag_chars
            .next()
            .and_then(CertificateKind::from_tag)
            .filter(|_| tag_chars.next().is_none())
            .ok_or_else(|| malformed("unrecognized kind tag"))?;

        if country.is_empty() || institution.is_empty() || suffix.is_empty() {
            return Err(malformed("empty component"));
        }
        if !luhn::validate(body, checksum) {
            return Err(malformed("check character mismatch"));
        }

        Ok(Self {
            country: country.to_string(),
            institution: institution.to_string(),
            kind,
            suffix: suffix.to_string(),
            checksum,
        })
    }

    fn body(country: &str, institution: &str, kind: CertificateKind, suffix: &str) -> String {
        format!("{UVCI_VERSION}:{country}:{institution}/{}/{suffix}", kind.tag())
    }
}

impl std::fmt::Display for Uvci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{URN_PREFIX}{}#{}",
            Self::body(&self.country, &self.institution, self.kind, &self.suffix),
            self.checksum
        )
    }
}

/// The persisted identifier record. Written once, read for existence
/// checks, never updated.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UvciRecord {
    /// The identifier string.
    pub uvci: String,

    /// When the identifier was generated.
    pub generated_at: DateTime<Utc>,

    /// When the associated certificate expires.
    pub expires_at: DateTime<Utc>,

    /// Opaque hash identifying the user.
    pub user_hash: String,

    /// Certificate kind the identifier was issued for.
    pub certificate_type: CertificateKind,

    /// Issuance scenario.
    pub certificate_scenario: Scenario,
}

/// Outcome of an atomic insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was persisted.
    Inserted,

    /// An identifier already exists for this user and scenario; it is
    /// returned instead of inserting a second one.
    AlreadyIssued(String),
}

/// Store-level failures, distinguishable so the generator can branch.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The generated identifier string already exists.
    #[error("identifier already exists")]
    DuplicateIdentifier,

    /// Any other store failure.
    #[error("store failure: {0}")]
    Other(String),
}

/// Persistent identifier store abstraction.
///
/// `insert` is atomic at the store: the existence checks and the write
/// happen in one operation, so the generator never assumes a local lock and
/// must instead tolerate the typed conflicts.
pub trait UvciStore: Send + Sync {
    /// Look up the identifier previously issued to this user and scenario,
    /// if any.
    fn existing_for_user(
        &self, user_hash: &str, scenario: Scenario,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;

    /// Atomically check-and-insert the record.
    fn insert(
        &self, record: &UvciRecord,
    ) -> impl Future<Output = Result<InsertOutcome, StoreError>> + Send;
}

/// Everything needed to generate and persist one identifier.
#[derive(Clone, Debug)]
pub struct GenerateCommand<'a> {
    /// ISO 3166 country code for the identifier.
    pub country: &'a str,

    /// Issuing institution code.
    pub institution: &'a str,

    /// Certificate kind being issued.
    pub kind: CertificateKind,

    /// Issuance scenario.
    pub scenario: Scenario,

    /// Opaque user hash for the persisted record.
    pub user_hash: &'a str,

    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,

    /// Certificate expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Source of suffix candidates, injectable so collision handling is
/// testable.
pub trait SuffixSource {
    /// Produce the next suffix candidate.
    fn next_suffix(&mut self) -> String;
}

/// Random suffixes over the uppercase alphanumeric charset.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&mut self) -> String {
        gen::suffix(SUFFIX_LEN)
    }
}

/// Check whether this user and scenario already hold an identifier.
///
/// Callers check this before generating so a duplicate certificate is never
/// issued for the same pair within its validity window.
///
/// # Errors
///
/// Returns [`UvciError::Store`] when the store fails.
pub async fn existing_for_user(
    store: &impl UvciStore, user_hash: &str, scenario: Scenario,
) -> Result<Option<String>, UvciError> {
    store
        .existing_for_user(user_hash, scenario)
        .await
        .map_err(|e| UvciError::Store(e.to_string()))
}

/// Generate an identifier and persist it, retrying on identifier collision.
///
/// Each attempt draws a fresh random suffix. A store-level duplicate of the
/// identifier string triggers regeneration; an identifier already issued to
/// the user/scenario short-circuits to that existing value. The identifier
/// is persisted before it is returned — no two concurrent callers can
/// receive the same fresh value.
///
/// # Errors
///
/// Returns [`UvciError::Exhausted`] after [`MAX_ATTEMPTS`] collisions and
/// [`UvciError::Store`] for any other store failure.
pub async fn generate_and_insert(
    store: &impl UvciStore, command: &GenerateCommand<'_>,
) -> Result<String, UvciError> {
    generate_and_insert_with(store, command, &mut RandomSuffix).await
}

/// [`generate_and_insert`] with an explicit suffix source.
///
/// # Errors
///
/// See [`generate_and_insert`].
pub async fn generate_and_insert_with(
    store: &impl UvciStore, command: &GenerateCommand<'_>, suffixes: &mut impl SuffixSource,
) -> Result<String, UvciError> {
    for attempt in 1..=MAX_ATTEMPTS {
        let uvci = Uvci::compose(
            command.country,
            command.institution,
            command.kind,
            suffixes.next_suffix(),
        )
        .to_string();

        let record = UvciRecord {
            uvci: uvci.clone(),
            generated_at: command.generated_at,
            expires_at: command.expires_at,
            user_hash: command.user_hash.to_string(),
            certificate_type: command.kind,
            certificate_scenario: command.scenario,
        };

        match store.insert(&record).await {
            Ok(InsertOutcome::Inserted) => return Ok(uvci),
            Ok(InsertOutcome::AlreadyIssued(existing)) => return Ok(existing),
            Err(StoreError::DuplicateIdentifier) => {
                tracing::debug!(attempt, "identifier collision, regenerating");
            }
            Err(StoreError::Other(e)) => return Err(UvciError::Store(e)),
        }
    }
    Err(UvciError::Exhausted(MAX_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        inner: Mutex<MemoryStoreInner>,
    }

    #[derive(Default)]
    struct MemoryStoreInner {
        identifiers: HashSet<String>,
        by_user: HashMap<(String, Scenario), String>,
    }

    impl UvciStore for MemoryStore {
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
            Ok(InsertOutcome::Inserted)
        }
    }

    struct FixedSuffixes(Vec<&'static str>);

    impl SuffixSource for FixedSuffixes {
        fn next_suffix(&mut self) -> String {
            if self.0.is_empty() { "FALLBACK00AA".into() } else { self.0.remove(0).into() }
        }
    }

    fn command(user: &str) -> GenerateCommand<'_> {
        GenerateCommand {
            country: "GB",
            institution: "NHSX",
            kind: CertificateKind::Vaccination,
            scenario: Scenario::Domestic,
            user_hash: user,
            generated_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(365),
        }
    }

    #[test]
    fn compose_and_parse_roundtrip() {
        let uvci = Uvci::compose("GB", "NHSX", CertificateKind::Vaccination, "ABC123DEF456");
        let text = uvci.to_string();
        assert!(text.starts_with("URN:UVCI:01:GB:NHSX/V/ABC123DEF456#"));

        let parsed = Uvci::parse(&text).expect("should parse");
        assert_eq!(parsed, uvci);
    }

    #[test]
    fn parse_rejects_corruption() {
        let text = Uvci::compose("GB", "NHSX", CertificateKind::Recovery, "ABC123DEF456")
            .to_string();

        assert!(Uvci::parse(&text.replace("ABC", "ABD")).is_err(), "check detects edits");
        assert!(Uvci::parse(&text.replace("/R/", "/X/")).is_err(), "unknown kind tag");
        assert!(Uvci::parse(&text.replace("URN:UVCI:", "URN:OTHER:")).is_err());
        assert!(Uvci::parse(text.split('#').next().unwrap()).is_err(), "missing check");
        assert!(Uvci::parse(&text.replace(":01:", ":02:")).is_err(), "unknown version");
    }

    #[tokio::test]
    async fn persists_before_returning() {
        let store = MemoryStore::default();
        let uvci =
            generate_and_insert(&store, &command("user-1")).await.expect("should generate");

        assert_eq!(
            existing_for_user(&store, "user-1", Scenario::Domestic).await.unwrap(),
            Some(uvci.clone())
        );
        Uvci::parse(&uvci).expect("generated identifiers parse back");
    }

    #[tokio::test]
    async fn collision_retries_with_fresh_suffix() {
        let store = MemoryStore::default();
        // Seed the colliding identifier under a different user.
        generate_and_insert_with(
            &store,
            &command("other-user"),
            &mut FixedSuffixes(vec!["SAMESAMESAME"]),
        )
        .await
        .expect("seed");

        let uvci = generate_and_insert_with(
            &store,
            &command("user-1"),
            &mut FixedSuffixes(vec!["SAMESAMESAME", "FRESHFRESH00"]),
        )
        .await
        .expect("should retry past the collision");
        assert!(uvci.contains("FRESHFRESH00"));
    }

    #[tokio::test]
    async fn exhaustion_after_bounded_retries() {
        let store = MemoryStore::default();
        generate_and_insert_with(
            &store,
            &command("other-user"),
            &mut FixedSuffixes(vec!["SAMESAMESAME"]),
        )
        .await
        .expect("seed");

        let err = generate_and_insert_with(
            &store,
            &command("user-1"),
            &mut FixedSuffixes(vec!["SAMESAMESAME", "SAMESAMESAME", "SAMESAMESAME"]),
        )
        .await
        .expect_err("every attempt collides");
        assert!(matches!(err, UvciError::Exhausted(MAX_ATTEMPTS)));
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_user_yield_one_record() {
        let store = Arc::new(MemoryStore::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                generate_and_insert(store.as_ref(), &command("user-1")).await.expect("succeeds")
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.expect("task completes"));
        }

        // Exactly one persisted record; every caller received that value.
        let inner = store.inner.lock().await;
        assert_eq!(inner.identifiers.len(), 1);
        assert!(results.iter().all(|r| inner.identifiers.contains(r)));
    }
}
