//! # Canonical Record Model
//!
//! Typed representation of a person's health claim, independent of any wire
//! format. Records are constructed by the (external) eligibility engine and
//! owned transiently by a pipeline call; the pipeline never persists them.

use chrono::{DateTime, NaiveDate, Utc};
use hcert_core::{ErrorCode, ErrorList};
use serde::{Deserialize, Serialize};

/// The closed set of certificate kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CertificateKind {
    /// Vaccination event certificate.
    Vaccination,

    /// Test result certificate.
    Test,

    /// Recovery certificate.
    Recovery,

    /// Domestic exemption certificate.
    DomesticExemption,
}

impl CertificateKind {
    /// Single-character tag embedded in unique certificate identifiers.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::Vaccination => 'V',
            Self::Test => 'T',
            Self::Recovery => 'R',
            Self::DomesticExemption => 'D',
        }
    }

    /// Resolve a single-character identifier tag back to a kind.
    #[must_use]
    pub const fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'V' => Some(Self::Vaccination),
            'T' => Some(Self::Test),
            'R' => Some(Self::Recovery),
            'D' => Some(Self::DomesticExemption),
            _ => None,
        }
    }
}

impl std::fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Vaccination => "Vaccination",
            Self::Test => "Test",
            Self::Recovery => "Recovery",
            Self::DomesticExemption => "DomesticExemption",
        };
        f.write_str(name)
    }
}

/// Identity of the certificate subject. Exactly one subject per record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subject {
    /// Family name as printed.
    pub family_name: String,

    /// Given name as printed.
    pub given_name: String,

    /// Date of birth, when known.
    pub date_of_birth: Option<NaiveDate>,
}

/// A vaccination event.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Vaccination {
    /// Authorized product code, e.g. `EU/1/20/1507`.
    pub product: String,

    /// Marketing authorization holder code.
    pub manufacturer: String,

    /// Vaccine or prophylaxis classification code, when known.
    pub prophylaxis: Option<String>,

    /// Dose number within the series.
    pub dose_number: u32,

    /// Total doses in the series.
    pub series_doses: u32,

    /// Batch number, when recorded.
    pub batch: Option<String>,

    /// Date the dose was administered.
    pub vaccinated_on: NaiveDate,

    /// Country of vaccination.
    pub country: String,

    /// Administering site, when recorded.
    pub site: Option<String>,
}

/// A test result.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TestResult {
    /// Test type code.
    pub test_type: String,

    /// Result code.
    pub result: String,

    /// Sample collection time.
    pub sampled_at: DateTime<Utc>,

    /// Testing centre, when recorded.
    pub centre: Option<String>,

    /// Test device identifier, when recorded.
    pub device: Option<String>,
}

/// A recovery statement.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Recovery {
    /// Date of the first positive test.
    pub first_positive_on: NaiveDate,
}

/// A domestic exemption.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Exemption {
    /// Exemption policy code, when one applies.
    pub policy: Option<String>,
}

/// Kind-specific payload of a canonical record.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Claim {
    /// Vaccination event.
    Vaccination(Vaccination),

    /// Test result.
    Test(TestResult),

    /// Recovery statement.
    Recovery(Recovery),

    /// Domestic exemption.
    DomesticExemption(Exemption),
}

impl Claim {
    /// The kind this claim belongs to.
    #[must_use]
    pub const fn kind(&self) -> CertificateKind {
        match self {
            Self::Vaccination(_) => CertificateKind::Vaccination,
            Self::Test(_) => CertificateKind::Test,
            Self::Recovery(_) => CertificateKind::Recovery,
            Self::DomesticExemption(_) => CertificateKind::DomesticExemption,
        }
    }
}

/// A canonical health-claim record.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CanonicalRecord {
    /// The certificate subject.
    pub subject: Subject,

    /// Disease target code.
    pub disease: String,

    /// Issuing authority.
    pub issuer: String,

    /// Issuing country.
    pub country: String,

    /// Start of the validity window, inclusive.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window, inclusive.
    pub valid_until: DateTime<Utc>,

    /// Kind-specific payload.
    pub claim: Claim,
}

impl CanonicalRecord {
    /// Check record invariants, accumulating every violation.
    ///
    /// All applicable checks run in a single pass: a record missing both the
    /// subject name and the birth date reports both field errors, not just
    /// the first one encountered.
    #[must_use]
    pub fn validate(&self) -> ErrorList {
        let mut errors = ErrorList::new();

        if self.subject.family_name.trim().is_empty() {
            errors.push(ErrorCode::MissingRequiredField, "Patient.name.family");
        }
        if self.subject.given_name.trim().is_empty() {
            errors.push(ErrorCode::MissingRequiredField, "Patient.name.given");
        }
        if self.subject.date_of_birth.is_none() {
            errors.push(ErrorCode::MissingRequiredField, "Patient.birthDate");
        }
        if self.disease.trim().is_empty() {
            errors.push(ErrorCode::MissingRequiredField, "Immunization.targetDisease");
        }
        if self.valid_from > self.valid_until {
            errors.push(
                ErrorCode::InvalidValidityWindow,
                format!("validity starts {} after it ends {}", self.valid_from, self.valid_until),
            );
        }

        match &self.claim {
            Claim::Vaccination(v) => {
                if v.product.trim().is_empty() {
                    errors.push(ErrorCode::MissingRequiredField, "Immunization.vaccineCode");
                }
                if v.dose_number == 0 || v.series_doses == 0 {
                    errors.push(
                        ErrorCode::InvalidFieldValue,
                        "Immunization.protocolApplied.doseNumber",
                    );
                } else if v.dose_number > v.series_doses {
                    errors.push(
                        ErrorCode::DoseCountInvalid,
                        format!("dose {} of a {}-dose series", v.dose_number, v.series_doses),
                    );
                }
            }
            Claim::Test(t) => {
                if t.test_type.trim().is_empty() {
                    errors.push(ErrorCode::MissingRequiredField, "Observation.code");
                }
                if t.result.trim().is_empty() {
                    errors.push(ErrorCode::MissingRequiredField, "Observation.valueCodeableConcept");
                }
            }
            Claim::Recovery(_) | Claim::DomesticExemption(_) => {}
        }

        errors
    }
}
