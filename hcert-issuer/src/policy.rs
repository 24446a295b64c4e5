//! # Validity Policy
//!
//! Per-kind validity windows supplied by configuration. A requested window
//! that violates a configured bound is rejected explicitly — never silently
//! clamped — so the eligibility engine learns about the disagreement instead
//! of shipping a certificate with a window nobody asked for.

use chrono::{DateTime, Duration, Utc};
use hcert_core::{CertError, ErrorCode};
use hcert_schema::{CanonicalRecord, CertificateKind};

/// Validity bounds for one certificate kind.
#[derive(Clone, Debug)]
pub struct ValidityPolicy {
    /// Window applied when the eligibility engine supplies no explicit end.
    pub default_duration: Duration,

    /// Shortest acceptable window, when bounded.
    pub min_duration: Option<Duration>,

    /// Longest acceptable window, when bounded.
    pub max_duration: Option<Duration>,
}

impl ValidityPolicy {
    /// The end of a default window opening at `from`.
    #[must_use]
    pub fn default_end(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.default_duration
    }

    /// Resolve the validity end for a record, rejecting bound violations.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidValidityWindow` entry when the record's window is
    /// inverted or falls outside the configured bounds.
    pub fn resolve_end(&self, record: &CanonicalRecord) -> Result<DateTime<Utc>, CertError> {
        let duration = record.valid_until - record.valid_from;
        if duration < Duration::zero() {
            return Err(CertError::new(
                ErrorCode::InvalidValidityWindow,
                "validity window is inverted",
            ));
        }
        if let Some(min) = self.min_duration {
            if duration < min {
                return Err(CertError::new(
                    ErrorCode::InvalidValidityWindow,
                    format!("window of {} days is shorter than the configured minimum", duration.num_days()),
                ));
            }
        }
        if let Some(max) = self.max_duration {
            if duration > max {
                return Err(CertError::new(
                    ErrorCode::InvalidValidityWindow,
                    format!("window of {} days exceeds the configured maximum", duration.num_days()),
                ));
            }
        }
        Ok(record.valid_until)
    }
}

/// Validity policies for every certificate kind.
#[derive(Clone, Debug)]
pub struct IssuancePolicy {
    /// Vaccination certificates.
    pub vaccination: ValidityPolicy,

    /// Test result certificates.
    pub test: ValidityPolicy,

    /// Recovery certificates.
    pub recovery: ValidityPolicy,

    /// Domestic exemptions.
    pub exemption: ValidityPolicy,
}

impl IssuancePolicy {
    /// The policy governing `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: CertificateKind) -> &ValidityPolicy {
        match kind {
            CertificateKind::Vaccination => &self.vaccination,
            CertificateKind::Test => &self.test,
            CertificateKind::Recovery => &self.recovery,
            CertificateKind::DomesticExemption => &self.exemption,
        }
    }
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self {
            vaccination: ValidityPolicy {
                default_duration: Duration::days(365),
                min_duration: None,
                max_duration: Some(Duration::days(365)),
            },
            test: ValidityPolicy {
                default_duration: Duration::days(2),
                min_duration: None,
                max_duration: Some(Duration::days(14)),
            },
            recovery: ValidityPolicy {
                default_duration: Duration::days(180),
                min_duration: Some(Duration::days(1)),
                max_duration: Some(Duration::days(365)),
            },
            exemption: ValidityPolicy {
                default_duration: Duration::days(30),
                min_duration: None,
                max_duration: None,
            },
        }
    }
}
