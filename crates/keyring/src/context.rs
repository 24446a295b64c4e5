//! # Signing Context
//!
//! A loaded signing key plus its derived identifier. Contexts are created
//! once per key, cached by the ring, and shared read-only across concurrent
//! signing calls.

use base64ct::{Base64, Encoding};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use sha2::{Digest, Sha256};

use crate::KeyringError;

/// Length of the truncated key fingerprint.
pub const KEY_ID_LEN: usize = 8;

/// A cached ES256 signing context.
///
/// The key identifier is recomputed from the key material at construction,
/// never stored independently of it, so the fingerprint can never drift from
/// the key it names.
pub struct SigningContext {
    signing_key: SigningKey,
    key_id: [u8; KEY_ID_LEN],
    key_identifier: String,
}

impl SigningContext {
    /// Build a context from the raw P-256 secret scalar.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidKey`] when the bytes are not a valid
    /// P-256 secret key.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyringError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| KeyringError::InvalidKey(e.to_string()))?;
        let key_id = derive_key_id(signing_key.verifying_key())?;
        Ok(Self { signing_key, key_identifier: encode_key_id(&key_id), key_id })
    }

    /// Sign a message with ES256 (deterministic nonce), returning the raw
    /// 64-byte `r || s` signature the COSE envelope carries.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::Signing`] on cryptographic failure. Never
    /// returns an empty signature.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let signature: Signature = self
            .signing_key
            .try_sign(msg)
            .map_err(|e| KeyringError::Signing(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    /// The truncated key fingerprint placed in the COSE `kid` header.
    #[must_use]
    pub const fn key_id(&self) -> &[u8; KEY_ID_LEN] {
        &self.key_id
    }

    /// The textual key identifier used as the trust-list lookup key.
    #[must_use]
    pub fn key_identifier(&self) -> &str {
        &self.key_identifier
    }

    /// The verifying half of the key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The public key as an uncompressed SEC1 point, the form trust lists
    /// publish.
    #[must_use]
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material.
        write!(f, "SigningContext({})", self.key_identifier)
    }
}

/// Derive the truncated fingerprint of a public key: the first 8 bytes of
/// SHA-256 over the DER-encoded `SubjectPublicKeyInfo`.
///
/// A pure function of the key bytes — re-derivation never depends on any
/// cache state.
///
/// # Errors
///
/// Returns [`KeyringError::InvalidKey`] when the key cannot be DER-encoded.
pub fn derive_key_id(key: &VerifyingKey) -> Result<[u8; KEY_ID_LEN], KeyringError> {
    let der = key.to_public_key_der().map_err(|e| KeyringError::InvalidKey(e.to_string()))?;
    let digest = Sha256::digest(der.as_bytes());
    let mut key_id = [0u8; KEY_ID_LEN];
    key_id.copy_from_slice(&digest[..KEY_ID_LEN]);
    Ok(key_id)
}

/// Render a raw key fingerprint as its textual identifier.
#[must_use]
pub fn encode_key_id(key_id: &[u8]) -> String {
    Base64::encode_string(key_id)
}

/// Verify an ES256 signature (raw 64-byte `r || s`) over `msg` with a
/// SEC1-encoded public key.
///
/// Returns `Ok(false)` for a well-formed but non-matching or undecodable
/// signature; a key that cannot be parsed is an error rather than a
/// mismatch.
///
/// # Errors
///
/// Returns [`KeyringError::InvalidKey`] when the public key bytes are not a
/// valid SEC1 point.
pub fn verify(public_key_sec1: &[u8], msg: &[u8], signature: &[u8]) -> Result<bool, KeyringError> {
    let key = VerifyingKey::from_sec1_bytes(public_key_sec1)
        .map_err(|e| KeyringError::InvalidKey(e.to_string()))?;
    let Ok(signature) = Signature::from_slice(signature) else {
        return Ok(false);
    };
    Ok(key.verify(msg, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "6c1382765aec5358f117733d281c1c7bdc39884d04a45a1e6c67c858bc206c19";

    fn context() -> SigningContext {
        let bytes = hex::decode(SECRET).expect("valid hex");
        SigningContext::from_secret_bytes(&bytes).expect("valid key")
    }

    #[test]
    fn key_identifier_is_stable() {
        let a = context();
        let b = context();
        assert_eq!(a.key_identifier(), b.key_identifier());
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.key_id().len(), KEY_ID_LEN);
    }

    #[test]
    fn key_identifier_rederives_from_public_key() {
        let ctx = context();
        let derived = derive_key_id(ctx.verifying_key()).expect("derivable");
        assert_eq!(&derived, ctx.key_id());
        assert_eq!(encode_key_id(&derived), ctx.key_identifier());
    }

    #[test]
    fn sign_and_verify() {
        let ctx = context();
        let msg = b"signed payload";
        let sig = ctx.sign(msg).expect("should sign");
        assert_eq!(sig.len(), 64);
        assert!(verify(&ctx.public_key_sec1(), msg, &sig).expect("valid key"));
        assert!(!verify(&ctx.public_key_sec1(), b"other payload", &sig).expect("valid key"));
    }

    #[test]
    fn deterministic_signatures() {
        let ctx = context();
        let msg = b"reproducible";
        assert_eq!(ctx.sign(msg).unwrap(), ctx.sign(msg).unwrap());
    }

    #[test]
    fn garbage_signature_is_a_mismatch_not_an_error() {
        let ctx = context();
        assert!(!verify(&ctx.public_key_sec1(), b"msg", &[0u8; 10]).expect("valid key"));
    }

    #[test]
    fn invalid_key_bytes_rejected() {
        assert!(SigningContext::from_secret_bytes(&[0u8; 4]).is_err());
        assert!(verify(&[1, 2, 3], b"msg", &[0u8; 64]).is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let ctx = context();
        let debug = format!("{ctx:?}");
        assert!(debug.starts_with("SigningContext("));
        assert!(!debug.contains(SECRET));
    }
}
