//! # Certificate Schema
//!
//! The canonical health-claim record model, the condensed short-tag wire
//! schema, and the condenser mapping one to the other.

mod condense;
mod condensed;
mod record;

pub use condense::{condense, SchemaError};
pub use condensed::{
    transliterate, ExemptionEntry, HealthCertificate, Name, RecoveryEntry, TestEntry,
    VaccinationEntry, SCHEMA_VERSION,
};
pub use record::{
    CanonicalRecord, CertificateKind, Claim, Exemption, Recovery, Subject, TestResult, Vaccination,
};
