//! # Verify Endpoint
//!
//! Decodes an inbound barcode payload, checks its signature against the
//! current trust list snapshot, and validates the clinical fields against
//! the merged value sets. Field-level problems accumulate so a single pass
//! reports everything; a payload that cannot be authenticated yields errors
//! and no record at all.

use chrono::{DateTime, Utc};
use hcert_barcode::{DecodeError, SignedCertificate};
use hcert_core::{CertError, ErrorCode, ErrorList};
use hcert_schema::HealthCertificate;
use hcert_trustlist::{ids, TrustCache, TrustListSnapshot, ValueSetCache, ValueSets};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A verification request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VerifyRequest {
    /// The scanned barcode payload.
    pub barcode: String,

    /// Verification time; defaults to now.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// The outcome of verifying one payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerifyOutcome {
    /// The verified certificate; absent when the payload could not be
    /// decoded or authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<HealthCertificate>,

    /// Issuer country from the signed claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_country: Option<String>,

    /// Key identifier the payload named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_identifier: Option<String>,

    /// Every error recorded across the pipeline, in detection order.
    pub errors: ErrorList,
}

impl VerifyOutcome {
    /// `true` when the certificate is authentic and every check passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.record.is_some() && self.errors.is_empty()
    }

    fn failed(errors: ErrorList) -> Self {
        Self { errors, ..Self::default() }
    }
}

/// Verify a barcode payload against the caches.
///
/// The trust list and value sets are read from one snapshot each, taken at
/// entry — a refresh completing mid-verification never mixes generations.
#[instrument(level = "debug", skip(trust, values, request))]
pub fn verify(trust: &TrustCache, values: &ValueSetCache, request: &VerifyRequest) -> VerifyOutcome {
    let at = request.at.unwrap_or_else(Utc::now);
    let trust_snapshot = trust.snapshot();
    let value_snapshot = values.snapshot();

    // Decode failures are terminal: there is nothing further to check, but
    // the caller still receives the structured stage error.
    let signed = match hcert_barcode::decode(&request.barcode) {
        Ok(signed) => signed,
        Err(e) => {
            tracing::debug!(stage = e.stage(), "payload rejected while decoding");
            return VerifyOutcome::failed(decode_error(&e).into());
        }
    };

    match authenticate(&signed, &trust_snapshot) {
        Ok(key_identifier) => {
            let mut errors = ErrorList::new();
            check_window(&signed, at, &mut errors);
            check_fields(&signed.claims.certificate, value_snapshot.sets(), &mut errors);
            VerifyOutcome {
                record: Some(signed.claims.certificate),
                issuer_country: Some(signed.claims.issuer),
                key_identifier: Some(key_identifier),
                errors,
            }
        }
        // An unauthenticated payload yields exactly its error and no
        // partial record.
        Err(error) => VerifyOutcome::failed(error.into()),
    }
}

fn authenticate(
    signed: &SignedCertificate, snapshot: &TrustListSnapshot,
) -> Result<String, CertError> {
    let Some(kid) = signed.key_id() else {
        return Err(CertError::new(ErrorCode::KeyNotFound, "payload names no signing key"));
    };
    let key_identifier = hcert_keyring::encode_key_id(kid);

    let Some(trusted) = snapshot.public_key(&key_identifier) else {
        return Err(CertError::new(
            ErrorCode::KeyNotFound,
            format!("key {key_identifier} is not on the trust list"),
        ));
    };

    match hcert_keyring::verify(
        &trusted.public_key,
        &signed.signature_input(),
        signed.signature(),
    ) {
        Ok(true) => Ok(key_identifier),
        Ok(false) => Err(CertError::new(
            ErrorCode::SignatureInvalid,
            "signature does not verify against the trusted key",
        )),
        Err(e) => Err(CertError::new(
            ErrorCode::SignatureInvalid,
            format!("trusted key is unusable: {e}"),
        )),
    }
}

fn check_window(signed: &SignedCertificate, at: DateTime<Utc>, errors: &mut ErrorList) {
    match signed.claims.expires() {
        Some(expires) if expires < at => {
            errors.push(ErrorCode::CertificateExpired, format!("expired at {expires}"));
        }
        Some(_) => {}
        None => {
            errors.push(ErrorCode::InvalidFieldValue, "expiry is not a representable time");
        }
    }
    if let Some(issued) = signed.claims.issued() {
        if issued > at {
            errors.push(ErrorCode::CertificateNotYetValid, format!("issued at {issued}"));
        }
    }
}

// Every code check runs; nothing stops at the first unknown code.
fn check_fields(certificate: &HealthCertificate, sets: &ValueSets, errors: &mut ErrorList) {
    for entry in certificate.v.as_deref().unwrap_or_default() {
        check_code(sets, errors, ids::DISEASE_AGENT_TARGETED, &entry.tg, "tg");
        check_code(sets, errors, ids::VACCINE_PRODUCT, &entry.mp, "mp");
        check_code(sets, errors, ids::VACCINE_MAH, &entry.ma, "ma");
        if let Some(vp) = &entry.vp {
            check_code(sets, errors, ids::VACCINE_PROPHYLAXIS, vp, "vp");
        }
        if entry.dn > entry.sd {
            errors.push(
                ErrorCode::DoseCountInvalid,
                format!("dose {} of a {}-dose series", entry.dn, entry.sd),
            );
        }
    }
    for entry in certificate.t.as_deref().unwrap_or_default() {
        check_code(sets, errors, ids::DISEASE_AGENT_TARGETED, &entry.tg, "tg");
        check_code(sets, errors, ids::TEST_TYPE, &entry.tt, "tt");
        check_code(sets, errors, ids::TEST_RESULT, &entry.tr, "tr");
    }
    for entry in certificate.r.as_deref().unwrap_or_default() {
        check_code(sets, errors, ids::DISEASE_AGENT_TARGETED, &entry.tg, "tg");
    }
    for entry in certificate.d.as_deref().unwrap_or_default() {
        check_code(sets, errors, ids::DISEASE_AGENT_TARGETED, &entry.tg, "tg");
    }
}

fn check_code(sets: &ValueSets, errors: &mut ErrorList, set_id: &str, code: &str, tag: &str) {
    if !sets.is_active(set_id, code) {
        errors.push(ErrorCode::UnrecognizedCode, format!("{tag} code '{code}'"));
    }
}

fn decode_error(error: &DecodeError) -> CertError {
    let code = match error {
        DecodeError::Prefix => ErrorCode::MalformedPrefix,
        DecodeError::Version(_) => ErrorCode::UnknownVersion,
        DecodeError::Transport(_) => ErrorCode::MalformedTransport,
        DecodeError::Inflate(_) => ErrorCode::InflateFailed,
        DecodeError::Binary(_) => ErrorCode::MalformedBinary,
        DecodeError::Claims(_) => ErrorCode::MalformedClaims,
    };
    CertError::new(code, format!("{} stage: {error}", error.stage()))
}
