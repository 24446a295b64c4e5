//! # Certificate Issuance
//!
//! The issuance pipeline: canonical clinical records in, signed barcode
//! certificates out. Each request may cover several certificate kinds; the
//! outcomes share one unique certificate identifier and succeed or fail
//! independently, with every problem reported through the structured error
//! registry rather than a fault.

mod issue;
mod policy;

pub use issue::{issue, BarcodeResult, BarcodeResults, CertificateRequest, IssueRequest};
pub use policy::{IssuancePolicy, ValidityPolicy};
