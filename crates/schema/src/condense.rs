//! # Condenser
//!
//! Maps a canonical record plus issuance context into the condensed
//! short-tag structure. Deterministic: identical inputs always produce an
//! identical structure, which the encoder turns into identical bytes —
//! required for reproducible signatures.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::condensed::{
    transliterate, ExemptionEntry, HealthCertificate, Name, RecoveryEntry, TestEntry,
    VaccinationEntry, SCHEMA_VERSION,
};
use crate::record::{CanonicalRecord, CertificateKind, Claim};

/// Date format used by date-only short tags.
const DATE_FMT: &str = "%Y-%m-%d";

/// Schema mapping failure.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The record's claim does not match the kind being condensed.
    #[error("record carries a {found} claim, cannot be condensed as {requested}")]
    KindMismatch {
        /// Kind the caller asked for.
        requested: CertificateKind,
        /// Kind the record actually carries.
        found: CertificateKind,
    },
}

/// Condense a canonical record into the short-tag certificate structure.
///
/// `requested` names the certificate kind being issued and must match the
/// record's claim. `validity_end` closes the certificate's validity window
/// (`du` on window-carrying entries; the envelope expiry carries it
/// elsewhere, alongside the generation time). `issuer_country_override`
/// replaces the record's country attribution when the issuing region differs
/// from the clinical event's country.
///
/// # Errors
///
/// Returns [`SchemaError::KindMismatch`] when the record's claim kind is not
/// the requested kind.
pub fn condense(
    record: &CanonicalRecord, requested: CertificateKind, uvci: &str,
    validity_end: DateTime<Utc>, issuer_country_override: Option<&str>,
) -> Result<HealthCertificate, SchemaError> {
    let found = record.claim.kind();
    if found != requested {
        return Err(SchemaError::KindMismatch { requested, found });
    }

    let is = record.issuer.clone();
    let country = |claim_country: &str| {
        issuer_country_override.unwrap_or(claim_country).to_string()
    };

    let mut cert = HealthCertificate {
        ver: SCHEMA_VERSION.into(),
        nam: condense_name(record),
        dob: record.subject.date_of_birth.map(|d| d.format(DATE_FMT).to_string()),
        v: None,
        t: None,
        r: None,
        d: None,
    };

    match &record.claim {
        Claim::Vaccination(v) => {
            cert.v = Some(vec![VaccinationEntry {
                tg: record.disease.clone(),
                vp: v.prophylaxis.clone(),
                mp: v.product.clone(),
                ma: v.manufacturer.clone(),
                dn: v.dose_number,
                sd: v.series_doses,
                dt: v.vaccinated_on.format(DATE_FMT).to_string(),
                co: country(&v.country),
                is,
                ci: uvci.into(),
            }]);
        }
        Claim::Test(t) => {
            cert.t = Some(vec![TestEntry {
                tg: record.disease.clone(),
                tt: t.test_type.clone(),
                sc: t.sampled_at.to_rfc3339(),
                tr: t.result.clone(),
                tc: t.centre.clone(),
                ma: t.device.clone(),
                co: country(&record.country),
                is,
                ci: uvci.into(),
            }]);
        }
        Claim::Recovery(r) => {
            cert.r = Some(vec![RecoveryEntry {
                tg: record.disease.clone(),
                fr: r.first_positive_on.format(DATE_FMT).to_string(),
                co: country(&record.country),
                is,
                df: record.valid_from.date_naive().format(DATE_FMT).to_string(),
                du: validity_end.date_naive().format(DATE_FMT).to_string(),
                ci: uvci.into(),
            }]);
        }
        Claim::DomesticExemption(e) => {
            cert.d = Some(vec![ExemptionEntry {
                tg: record.disease.clone(),
                po: e.policy.clone(),
                co: country(&record.country),
                is,
                df: record.valid_from.date_naive().format(DATE_FMT).to_string(),
                du: validity_end.date_naive().format(DATE_FMT).to_string(),
                ci: uvci.into(),
            }]);
        }
    }

    Ok(cert)
}

fn condense_name(record: &CanonicalRecord) -> Name {
    let family = record.subject.family_name.trim();
    let given = record.subject.given_name.trim();
    Name {
        family: (!family.is_empty()).then(|| family.to_string()),
        fnt: transliterate(family),
        given: (!given.is_empty()).then(|| given.to_string()),
        gnt: (!given.is_empty()).then(|| transliterate(given)),
    }
}
