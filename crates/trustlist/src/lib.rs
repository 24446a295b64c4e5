//! # Trust List / Value Set Cache
//!
//! Process-wide caches of trusted public keys and recognized clinical codes,
//! refreshed by an external scheduler and shared read-only across concurrent
//! verification calls. Both caches replace their snapshot wholesale on
//! refresh — readers never observe a partially-updated list — and keep the
//! stale snapshot when a refresh fails.

mod trust;
mod valueset;

pub use trust::{
    RefreshError, TrustCache, TrustGateway, TrustListEntry, TrustListSnapshot, TrustedKey,
    DEFAULT_FETCH_TIMEOUT,
};
pub use valueset::{
    ids, SupplementalSource, ValueSet, ValueSetCache, ValueSetEntry, ValueSetGateway,
    ValueSetSnapshot, ValueSets,
};
