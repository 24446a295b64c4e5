//! # Issue Endpoint
//!
//! Turns a set of canonical records into signed barcode certificates, one
//! result per requested certificate kind sharing a single unique
//! certificate identifier.
//!
//! The pipeline accumulates structured errors rather than failing fast: a
//! kind whose record cannot be used is returned with `CanProvide = false`
//! and its error, while the sibling kinds still issue. Unexpected internal
//! failures are logged and folded into an `UnexpectedSystemError` entry —
//! the caller always receives a result document, never a fault.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hcert_barcode::CwtClaims;
use hcert_core::{CertError, ErrorCode, ErrorList, RegionConfig};
use hcert_keyring::{KeyRing, KeyStore, KeyringError, SigningContext};
use hcert_schema::{condense, CanonicalRecord, CertificateKind, Claim};
use hcert_uvci::{GenerateCommand, Scenario, UvciError, UvciStore};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::policy::IssuancePolicy;

/// One requested certificate kind and the clinical record backing it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CertificateRequest {
    /// Kind to issue.
    pub kind: CertificateKind,

    /// The record from the eligibility engine; `None` when it had nothing
    /// for this kind.
    pub record: Option<CanonicalRecord>,
}

/// An issuance request covering one or more certificate kinds.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IssueRequest {
    /// Issuing region settings.
    pub region: RegionConfig,

    /// Issuance scenario.
    pub scenario: Scenario,

    /// Opaque hash identifying the requesting user.
    pub user_hash: String,

    /// Generation time stamped into the certificates.
    pub generated_at: DateTime<Utc>,

    /// The kinds to issue.
    pub requested: Vec<CertificateRequest>,
}

/// Outcome for one requested kind.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BarcodeResult {
    /// The certificate identifier when one was issued, otherwise the kind
    /// tag.
    pub id: String,

    /// The kind this result answers.
    pub certificate_type: CertificateKind,

    /// Whether a certificate could be provided.
    pub can_provide: bool,

    /// The barcode payload; absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,

    /// The error that prevented issuance; at most one per result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CertError>,
}

impl BarcodeResult {
    fn provided(kind: CertificateKind, uvci: &str, barcode: String) -> Self {
        Self {
            id: uvci.to_string(),
            certificate_type: kind,
            can_provide: true,
            barcode: Some(barcode),
            error: None,
        }
    }

    fn denied(kind: CertificateKind, error: CertError) -> Self {
        Self {
            id: kind.tag().to_string(),
            certificate_type: kind,
            can_provide: false,
            barcode: None,
            error: Some(error),
        }
    }
}

/// The result document for one issuance request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BarcodeResults {
    /// The identifier shared by every issued certificate in this set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uvci: Option<String>,

    /// One result per requested kind, in request order.
    pub results: Vec<BarcodeResult>,

    /// Every error recorded across the pipeline, in detection order.
    pub errors: ErrorList,
}

/// Issue certificates for every requested kind.
///
/// Validation failures, identifier exhaustion, and signing problems are all
/// reported through the returned document; this function does not fail.
#[instrument(level = "debug", skip(ring, store, policy, request))]
pub async fn issue<K: KeyStore, U: UvciStore>(
    ring: &KeyRing<K>, store: &U, policy: &IssuancePolicy, request: &IssueRequest,
) -> BarcodeResults {
    let mut errors = ErrorList::new();
    if let Err(terminal) = verify(request) {
        errors.add(terminal);
        return BarcodeResults { uvci: None, results: Vec::new(), errors };
    }
    process(ring, store, policy, request, errors).await
}

// A terminal fault in the request envelope short-circuits the per-kind work
// but still comes back as a populated error document.
fn verify(request: &IssueRequest) -> Result<(), CertError> {
    tracing::debug!("issue::verify");

    if request.requested.is_empty() {
        return Err(CertError::new(
            ErrorCode::InvalidFieldValue,
            "no certificate types requested",
        ));
    }
    if request.user_hash.trim().is_empty() {
        return Err(CertError::new(ErrorCode::MissingRequiredField, "Request.userHash"));
    }
    if request.region.signing_certificate_identifier.trim().is_empty() {
        return Err(CertError::new(
            ErrorCode::MissingRequiredField,
            "Region.SigningCertificateIdentifier",
        ));
    }
    Ok(())
}

struct Prepared<'a> {
    index: usize,
    kind: CertificateKind,
    record: &'a CanonicalRecord,
    end: DateTime<Utc>,
}

async fn process<K: KeyStore, U: UvciStore>(
    ring: &KeyRing<K>, store: &U, policy: &IssuancePolicy, request: &IssueRequest,
    mut errors: ErrorList,
) -> BarcodeResults {
    tracing::debug!("issue::process");

    let mut slots: Vec<Option<BarcodeResult>> = vec![None; request.requested.len()];
    let mut prepared = Vec::new();

    // Validate every record in one pass, collecting all applicable errors.
    for (index, req) in request.requested.iter().enumerate() {
        let Some(record) = req.record.as_ref() else {
            let error = CertError::new(
                ErrorCode::MissingRequiredField,
                format!("no clinical record available for {}", req.kind),
            );
            errors.add(error.clone());
            slots[index] = Some(BarcodeResult::denied(req.kind, error));
            continue;
        };

        let mut record_errors = record.validate();
        if record.claim.kind() != req.kind {
            record_errors.push(
                ErrorCode::UnsupportedCertificateKind,
                format!("record carries a {} claim", record.claim.kind()),
            );
        }
        let end = match policy.for_kind(req.kind).resolve_end(record) {
            Ok(end) => Some(end),
            Err(error) => {
                record_errors.add(error);
                None
            }
        };

        match (record_errors.is_empty(), end) {
            (true, Some(end)) => {
                prepared.push(Prepared { index, kind: req.kind, record, end });
            }
            _ => {
                let first = record_errors
                    .iter()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| CertError::bare(ErrorCode::UnexpectedSystemError));
                slots[index] = Some(BarcodeResult::denied(req.kind, first));
                errors.absorb(record_errors);
            }
        }
    }

    // One shared identifier per result set, persisted before any barcode is
    // handed out. An identifier already issued to this user and scenario is
    // reused rather than duplicated.
    let mut uvci = None;
    if !prepared.is_empty() {
        match resolve_uvci(store, request, &prepared).await {
            Ok(value) => uvci = Some(value),
            Err(e) => {
                tracing::error!(error = %e, "identifier generation failed");
                let error = match e {
                    UvciError::Exhausted(_) => {
                        CertError::new(ErrorCode::UvciGenerationExhausted, e.to_string())
                    }
                    _ => CertError::new(ErrorCode::UnexpectedSystemError, e.to_string()),
                };
                errors.add(error.clone());
                deny_all(&mut slots, prepared.drain(..), &error);
            }
        }
    }

    // One signing context per request; concurrent requests for the same key
    // share the cached context.
    let mut context: Option<Arc<SigningContext>> = None;
    if !prepared.is_empty() {
        match ring.context(&request.region.signing_certificate_identifier).await {
            Ok(ctx) => context = Some(ctx),
            Err(e) => {
                tracing::error!(error = %e, "signing context unavailable");
                let error = match &e {
                    KeyringError::KeyNotFound(_) => {
                        CertError::new(ErrorCode::KeyNotFound, e.to_string())
                    }
                    _ => CertError::new(ErrorCode::UnexpectedSystemError, e.to_string()),
                };
                errors.add(error.clone());
                deny_all(&mut slots, prepared.drain(..), &error);
            }
        }
    }

    if let (Some(uvci), Some(context)) = (uvci.as_deref(), context.as_deref()) {
        for p in prepared {
            match encode_one(&request.region, request.generated_at, &p, uvci, context) {
                Ok(barcode) => {
                    slots[p.index] = Some(BarcodeResult::provided(p.kind, uvci, barcode));
                }
                Err(error) => {
                    tracing::error!(kind = %p.kind, error = %error, "barcode encoding failed");
                    errors.add(error.clone());
                    slots[p.index] = Some(BarcodeResult::denied(p.kind, error));
                }
            }
        }
    }

    BarcodeResults { uvci, results: slots.into_iter().flatten().collect(), errors }
}

async fn resolve_uvci<U: UvciStore>(
    store: &U, request: &IssueRequest, prepared: &[Prepared<'_>],
) -> Result<String, UvciError> {
    if let Some(existing) =
        hcert_uvci::existing_for_user(store, &request.user_hash, request.scenario).await?
    {
        tracing::debug!("reusing existing identifier");
        return Ok(existing);
    }

    let expires = prepared.iter().map(|p| p.end).max().unwrap_or(request.generated_at);
    // The shared identifier carries the tag of the first issued kind.
    let command = GenerateCommand {
        country: &request.region.uvci_country_code,
        institution: &request.region.issuing_institution,
        kind: prepared[0].kind,
        scenario: request.scenario,
        user_hash: &request.user_hash,
        generated_at: request.generated_at,
        expires_at: expires,
    };
    hcert_uvci::generate_and_insert(store, &command).await
}

fn encode_one(
    region: &RegionConfig, generated_at: DateTime<Utc>, prepared: &Prepared<'_>, uvci: &str,
    context: &SigningContext,
) -> Result<String, CertError> {
    // Test results performed abroad keep their own country; results with no
    // attribution fall back to the region's default.
    let country_override = match &prepared.record.claim {
        Claim::Test(_) if prepared.record.country.trim().is_empty() => {
            Some(region.default_result_country.as_str())
        }
        _ => None,
    };

    let certificate =
        condense(prepared.record, prepared.kind, uvci, prepared.end, country_override)
            .map_err(|e| CertError::new(ErrorCode::UnsupportedCertificateKind, e.to_string()))?;
    let claims =
        CwtClaims::new(region.issuing_country.clone(), generated_at, prepared.end, certificate);

    hcert_barcode::encode(&claims, context)
        .map_err(|e| CertError::new(ErrorCode::UnexpectedSystemError, e.to_string()))
}

fn deny_all<'a>(
    slots: &mut [Option<BarcodeResult>], prepared: impl Iterator<Item = Prepared<'a>>,
    error: &CertError,
) {
    for p in prepared {
        slots[p.index] = Some(BarcodeResult::denied(p.kind, error.clone()));
    }
}
