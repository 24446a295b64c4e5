//! # Certificate Verification
//!
//! The verification pipeline: a scanned barcode payload in, a verified
//! record plus a structured error collection out. Signing keys are resolved
//! through the injected trust cache and clinical codes through the merged
//! value sets; both are read from single consistent snapshots for the
//! duration of one call.

mod verify;

pub use verify::{verify, VerifyOutcome, VerifyRequest};
