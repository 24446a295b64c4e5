//! # Region Configuration
//!
//! Per-region issuance settings supplied by configuration. The pipeline
//! consumes these read-only; loading and validation of the configuration
//! source is out of scope.

use serde::{Deserialize, Serialize};

/// Issuance settings for one issuing authority/region.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionConfig {
    /// Key used to select this region from an inbound request.
    pub subscription_key_identifier: String,

    /// Issuing institution code, embedded in generated identifiers.
    pub issuing_institution: String,

    /// ISO 3166 country code used in generated identifiers.
    #[serde(rename = "UVCICountryCode")]
    pub uvci_country_code: String,

    /// Country of issuance placed in the certificate (`co`/`is` tags).
    pub issuing_country: String,

    /// Identifier of the signing key in the external secret store.
    pub signing_certificate_identifier: String,

    /// Country applied to test results that carry none of their own.
    pub default_result_country: String,

    /// Client certificate thumbprints accepted for this region.
    #[serde(default)]
    pub allowed_thumbprints: Vec<String>,
}

impl RegionConfig {
    /// `true` when the thumbprint is on the accepted list.
    ///
    /// Comparison is case-insensitive; thumbprints are hex strings whose
    /// casing varies by the tooling that produced them.
    #[must_use]
    pub fn accepts_thumbprint(&self, thumbprint: &str) -> bool {
        self.allowed_thumbprints.iter().any(|t| t.eq_ignore_ascii_case(thumbprint))
    }
}
