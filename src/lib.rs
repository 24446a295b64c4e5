//! An API for issuing and verifying digital health certificates encoded as
//! signed, compressed, scannable barcode payloads.
//!
//! Certificates are condensed into a short-tag map, serialized to CBOR,
//! wrapped in a `COSE_Sign1` envelope, deflated, and Base45-encoded behind a
//! versioned `HC1:` prefix. Verification reverses each step strictly,
//! resolving the signing key through a periodically refreshed trust list and
//! checking clinical codes against merged value sets.
//!
//! # Feature Flags
//!
//! There is no default feature. The following features are available:
//!
//! * `issuer` - Enables the issuance API.
//! * `verifier` - Enables the verification API.

#[cfg(feature = "issuer")]
pub use hcert_issuer as issuer;

#[cfg(feature = "verifier")]
pub use hcert_verifier as verifier;

/// Re-export the error registry and accumulating error list.
pub mod error {
    pub use hcert_core::error::{CertError, ErrorCode, ErrorList};
}

/// Re-export the canonical record model and condensed types.
pub mod schema {
    pub use hcert_schema::*;
}

/// Re-export the barcode encoder/decoder.
pub mod barcode {
    pub use hcert_barcode::*;
}

/// Re-export signing and key-ring types.
pub mod keyring {
    pub use hcert_keyring::*;
}

/// Re-export the trust list and value set caches.
pub mod trustlist {
    pub use hcert_trustlist::*;
}

/// Re-export the unique certificate identifier generator.
pub mod uvci {
    pub use hcert_uvci::*;
}

pub use hcert_core::region::RegionConfig;
