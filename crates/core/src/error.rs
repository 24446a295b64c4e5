//! # Error Registry
//!
//! The fixed numeric error registry shared by every pipeline stage, plus the
//! ordered, accumulating error list returned to callers.
//!
//! Validators append to an [`ErrorList`] and keep going where safe, so a
//! single pass reports every applicable problem. The presence of one or more
//! entries means the operation as a whole did not succeed, regardless of any
//! partial output that was produced alongside.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Stable numeric error codes.
///
/// Codes are part of the external contract: API consumers branch on them
/// programmatically, so variants are never renumbered or reused. Message text
/// is informational only and may be empty for self-describing codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// No client certificate was presented.
    MissingClientCertificate = 1000,

    /// The presented client certificate is not on the accepted list.
    InvalidClientCertificate = 1001,

    /// A required clinical or identity field is absent. The message carries
    /// the exact field path.
    MissingRequiredField = 2000,

    /// A field is present but its value cannot be used.
    InvalidFieldValue = 2001,

    /// The record kind cannot be expressed in the requested scheme.
    UnsupportedCertificateKind = 2002,

    /// Dose number exceeds the number of doses in the series.
    DoseCountInvalid = 3000,

    /// A code is not a member of the applicable value set.
    UnrecognizedCode = 3001,

    /// The issuing country is not on the accepted list.
    CountryNotAccepted = 3002,

    /// The validity window is inverted or violates a configured bound.
    InvalidValidityWindow = 3003,

    /// The certificate's validity window has ended.
    CertificateExpired = 3004,

    /// The certificate's validity window has not started.
    CertificateNotYetValid = 3005,

    /// An unexpected internal failure, caught at the pipeline boundary.
    UnexpectedSystemError = 4000,

    /// Identifier generation gave up after exhausting its retry limit.
    UvciGenerationExhausted = 4001,

    /// The requested operation is disabled for this deployment.
    FeatureDisabled = 5000,

    /// The barcode payload does not start with a known scheme prefix.
    MalformedPrefix = 6000,

    /// The scheme prefix carries a version this decoder does not support.
    UnknownVersion = 6001,

    /// The transport encoding (Base45) could not be decoded.
    MalformedTransport = 6002,

    /// The compressed body could not be inflated, or inflates beyond the
    /// permitted size.
    InflateFailed = 6003,

    /// The binary body is not a well-formed signed certificate structure.
    MalformedBinary = 6004,

    /// The signed structure decoded, but its claims are not usable.
    MalformedClaims = 6005,

    /// The key identifier does not resolve against the trust list.
    KeyNotFound = 7000,

    /// The signature does not verify against the resolved public key.
    SignatureInvalid = 7001,
}

impl ErrorCode {
    /// The numeric value rendered on the wire.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Resolve a numeric code back to its registry entry.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::MissingClientCertificate),
            1001 => Some(Self::InvalidClientCertificate),
            2000 => Some(Self::MissingRequiredField),
            2001 => Some(Self::InvalidFieldValue),
            2002 => Some(Self::UnsupportedCertificateKind),
            3000 => Some(Self::DoseCountInvalid),
            3001 => Some(Self::UnrecognizedCode),
            3002 => Some(Self::CountryNotAccepted),
            3003 => Some(Self::InvalidValidityWindow),
            3004 => Some(Self::CertificateExpired),
            3005 => Some(Self::CertificateNotYetValid),
            4000 => Some(Self::UnexpectedSystemError),
            4001 => Some(Self::UvciGenerationExhausted),
            5000 => Some(Self::FeatureDisabled),
            6000 => Some(Self::MalformedPrefix),
            6001 => Some(Self::UnknownVersion),
            6002 => Some(Self::MalformedTransport),
            6003 => Some(Self::InflateFailed),
            6004 => Some(Self::MalformedBinary),
            6005 => Some(Self::MalformedClaims),
            7000 => Some(Self::KeyNotFound),
            7001 => Some(Self::SignatureInvalid),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single structured error: registry code plus informational message.
///
/// Serializes as `{"Code": "<numeric string>", "Message": "<string>"}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertError {
    /// Registry code.
    pub code: ErrorCode,

    /// Informational message. May be empty for self-describing codes.
    pub message: String,
}

impl CertError {
    /// Create an error with a message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Create an error with an empty message.
    #[must_use]
    pub const fn bare(code: ErrorCode) -> Self {
        Self { code, message: String::new() }
    }
}

impl fmt::Display for CertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for CertError {}

impl Serialize for CertError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CertError", 2)?;
        s.serialize_field("Code", &self.code.code().to_string())?;
        s.serialize_field("Message", &self.message)?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for CertError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "Code")]
            code: String,
            #[serde(rename = "Message", default)]
            message: String,
        }

        let wire = Wire::deserialize(deserializer)?;
        let numeric =
            wire.code.parse::<u16>().map_err(|_| de::Error::custom("non-numeric error code"))?;
        let code = ErrorCode::from_code(numeric)
            .ok_or_else(|| de::Error::custom(format!("unknown error code {numeric}")))?;
        Ok(Self { code, message: wire.message })
    }
}

/// Ordered collection of structured errors.
///
/// Entries are appended in the order they were detected and are never
/// deduplicated: two stages reporting the same code produce two entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorList(Vec<CertError>);

impl ErrorList {
    /// An empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an error built from a code and message.
    pub fn push(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.0.push(CertError::new(code, message));
    }

    /// Append an already-built error.
    pub fn add(&mut self, error: CertError) {
        self.0.push(error);
    }

    /// Append every entry of another list, preserving order.
    pub fn absorb(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// `true` when no errors have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in detection order.
    pub fn iter(&self) -> std::slice::Iter<'_, CertError> {
        self.0.iter()
    }

    /// `true` when an entry with the given code is present.
    #[must_use]
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.0.iter().any(|e| e.code == code)
    }

    /// Consume the list, yielding its entries.
    #[must_use]
    pub fn into_inner(self) -> Vec<CertError> {
        self.0
    }
}

impl From<CertError> for ErrorList {
    fn from(error: CertError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ErrorList {
    type IntoIter = std::vec::IntoIter<CertError>;
    type Item = CertError;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type IntoIter = std::slice::Iter<'a, CertError>;
    type Item = &'a CertError;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
