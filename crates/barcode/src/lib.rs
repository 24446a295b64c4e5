//! # Barcode Payload Codec
//!
//! Turns signed claims into a scannable text payload and strictly reverses
//! the transformation:
//!
//! ```text
//! [scheme "HC"][version digit][":"][Base45(zlib(tagged COSE_Sign1 CBOR))]
//! ```
//!
//! Decoding identifies the failing stage — prefix, version, transport,
//! inflate, binary, claims — rather than collapsing everything into one
//! generic error; verifiers surface the stage for diagnostics. Oversized
//! payloads are rejected before the inflater runs and decompressed output is
//! capped, so a crafted payload cannot balloon in memory.

pub mod base45;
pub mod cbor;
mod cwt;

use std::io::{Read, Write};

use ciborium::Value;
use coset::{
    iana, CborSerializable, CoseSign1, Header, HeaderBuilder, ProtectedHeader,
    TaggedCborSerializable,
};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hcert_keyring::SigningContext;
use thiserror::Error;

pub use crate::cwt::{
    CwtClaims, CwtError, CLAIM_EXPIRES, CLAIM_HCERT, CLAIM_ISSUED_AT, CLAIM_ISSUER,
    HCERT_CONTAINER_KEY,
};

/// Fixed scheme identifier opening every payload.
pub const SCHEME: &str = "HC";

/// Version written by the encoder.
pub const CURRENT_VERSION: char = '1';

/// Versions the decoder accepts: the current one plus one prior.
pub const SUPPORTED_VERSIONS: &[char] = &['0', '1'];

/// Upper bound on the transport text accepted by the decoder. Anything
/// larger cannot have come out of a scannable barcode.
pub const MAX_PAYLOAD_CHARS: usize = 8192;

// Cap on inflated output; genuine certificates stay well under this.
const MAX_INFLATED_LEN: usize = 32 * 1024;

/// Encoding failures.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Claims could not be rendered into the CBOR claims map.
    #[error("claims could not be rendered: {0}")]
    Claims(#[from] CwtError),

    /// CBOR serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Signing failed.
    #[error(transparent)]
    Signing(#[from] hcert_keyring::KeyringError),

    /// The envelope could not be assembled or compressed.
    #[error("envelope assembly failed: {0}")]
    Envelope(String),
}

/// Decoding failures, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload does not open with a recognized scheme prefix.
    #[error("payload does not carry a recognized scheme prefix")]
    Prefix,

    /// The scheme is recognized but the version is not supported.
    #[error("unsupported payload version {0:?}")]
    Version(char),

    /// The Base45 transport body could not be decoded, or the text exceeds
    /// the transport bound.
    #[error("transport decoding failed: {0}")]
    Transport(String),

    /// The compressed body could not be inflated within the size cap.
    #[error("inflate failed: {0}")]
    Inflate(String),

    /// The inflated bytes are not a well-formed COSE_Sign1 structure.
    #[error("malformed signed binary: {0}")]
    Binary(String),

    /// The envelope is sound but its claims payload is not.
    #[error("malformed claims: {0}")]
    Claims(String),
}

impl DecodeError {
    /// The pipeline stage that failed, for diagnostics.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Version(_) => "version",
            Self::Transport(_) => "transport",
            Self::Inflate(_) => "inflate",
            Self::Binary(_) => "binary",
            Self::Claims(_) => "claims",
        }
    }
}

/// A decoded, not-yet-verified certificate payload.
#[derive(Debug)]
pub struct SignedCertificate {
    /// Version digit the payload carried.
    pub version: char,

    /// The COSE_Sign1 envelope as received.
    pub cose: CoseSign1,

    /// The claims parsed from the envelope payload.
    pub claims: CwtClaims,
}

impl SignedCertificate {
    /// The raw key fingerprint from the protected header, falling back to
    /// the unprotected one. `None` when the envelope names no key.
    #[must_use]
    pub fn key_id(&self) -> Option<&[u8]> {
        if !self.cose.protected.header.key_id.is_empty() {
            return Some(&self.cose.protected.header.key_id);
        }
        if !self.cose.unprotected.key_id.is_empty() {
            return Some(&self.cose.unprotected.key_id);
        }
        None
    }

    /// The signature bytes carried by the envelope.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.cose.signature
    }

    /// The exact bytes the signature covers: the COSE `Sig_structure`
    /// rebuilt from the received protected header and payload.
    #[must_use]
    pub fn signature_input(&self) -> Vec<u8> {
        coset::sig_structure_data(
            coset::SignatureContext::CoseSign1,
            self.cose.protected.clone(),
            None,
            &[],
            self.cose.payload.as_deref().unwrap_or_default(),
        )
    }
}

/// Encode signed claims into a barcode payload.
///
/// The claims map is CBOR-serialized, signed over its `Sig_structure` with
/// the given context (alg ES256, kid = truncated key fingerprint in the
/// protected header), wrapped as a tagged `COSE_Sign1`, deflated, and
/// Base45-armored behind the `HC1:` prefix.
///
/// Identical claims and key produce identical output: serialization order is
/// fixed and ES256 signing uses deterministic nonces.
///
/// # Errors
///
/// Returns an [`EncodeError`] naming the failed step.
pub fn encode(claims: &CwtClaims, signer: &SigningContext) -> Result<String, EncodeError> {
    let claims_value = Value::try_from(claims)?;
    let payload =
        cbor::to_vec(&claims_value).map_err(|e| EncodeError::Serialize(e.to_string()))?;

    let protected = ProtectedHeader {
        original_data: None,
        header: HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .key_id(signer.key_id().to_vec())
            .build(),
    };
    let to_be_signed = coset::sig_structure_data(
        coset::SignatureContext::CoseSign1,
        protected.clone(),
        None,
        &[],
        &payload,
    );
    let signature = signer.sign(&to_be_signed)?;

    let cose = CoseSign1 {
        protected,
        unprotected: Header::default(),
        payload: Some(payload),
        signature,
    };
    let bytes = cose.to_tagged_vec().map_err(|e| EncodeError::Envelope(e.to_string()))?;

    encode_payload(&bytes)
}

/// Compress and armor raw envelope bytes into the transport text.
///
/// # Errors
///
/// Returns [`EncodeError::Envelope`] when compression fails.
pub fn encode_payload(bytes: &[u8]) -> Result<String, EncodeError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(|e| EncodeError::Envelope(e.to_string()))?;
    let compressed = encoder.finish().map_err(|e| EncodeError::Envelope(e.to_string()))?;

    Ok(format!("{SCHEME}{CURRENT_VERSION}:{}", base45::encode(&compressed)))
}

/// Strip the prefix and reverse the transport and compression layers,
/// returning the version digit and the raw envelope bytes.
///
/// # Errors
///
/// Returns a [`DecodeError`] for the first failing stage.
pub fn decode_payload(text: &str) -> Result<(char, Vec<u8>), DecodeError> {
    if text.len() > MAX_PAYLOAD_CHARS {
        return Err(DecodeError::Transport(format!(
            "payload of {} chars exceeds the {MAX_PAYLOAD_CHARS} transport bound",
            text.len()
        )));
    }

    let rest = text.strip_prefix(SCHEME).ok_or(DecodeError::Prefix)?;
    let mut chars = rest.chars();
    let version = chars.next().ok_or(DecodeError::Prefix)?;
    if chars.next() != Some(':') {
        return Err(DecodeError::Prefix);
    }
    if !SUPPORTED_VERSIONS.contains(&version) {
        // A digit names a version this decoder does not speak; anything else
        // never was a version marker.
        if version.is_ascii_digit() {
            return Err(DecodeError::Version(version));
        }
        return Err(DecodeError::Prefix);
    }

    let compressed =
        base45::decode(chars.as_str()).map_err(|e| DecodeError::Transport(e.to_string()))?;
    let bytes = inflate_bounded(&compressed)?;
    Ok((version, bytes))
}

/// Decode a barcode payload into its signed certificate.
///
/// Reverses every encoding step strictly; no verification is performed
/// here — the caller checks the signature against its trust list.
///
/// # Errors
///
/// Returns a [`DecodeError`] for the first failing stage.
pub fn decode(text: &str) -> Result<SignedCertificate, DecodeError> {
    let (version, bytes) = decode_payload(text)?;

    // Envelopes are written tagged; accept untagged ones from older
    // issuers.
    let cose = CoseSign1::from_tagged_slice(&bytes)
        .or_else(|_| CoseSign1::from_slice(&bytes))
        .map_err(|e| DecodeError::Binary(e.to_string()))?;

    let payload = cose
        .payload
        .clone()
        .ok_or_else(|| DecodeError::Claims("envelope carries no payload".into()))?;
    let value: Value =
        cbor::from_slice(&payload).map_err(|e| DecodeError::Claims(e.to_string()))?;
    let claims = CwtClaims::try_from(value).map_err(|e| DecodeError::Claims(e.to_string()))?;

    Ok(SignedCertificate { version, cose, claims })
}

fn inflate_bounded(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(compressed).take(MAX_INFLATED_LEN as u64 + 1);
    decoder.read_to_end(&mut out).map_err(|e| DecodeError::Inflate(e.to_string()))?;
    if out.len() > MAX_INFLATED_LEN {
        return Err(DecodeError::Inflate(format!(
            "decompressed payload exceeds the {MAX_INFLATED_LEN} byte cap"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use hcert_schema::{HealthCertificate, Name, VaccinationEntry, SCHEMA_VERSION};

    use super::*;

    const SECRET: &str = "6c1382765aec5358f117733d281c1c7bdc39884d04a45a1e6c67c858bc206c19";

    fn signer() -> SigningContext {
        SigningContext::from_secret_bytes(&hex::decode(SECRET).expect("valid hex"))
            .expect("valid key")
    }

    fn claims() -> CwtClaims {
        let certificate = HealthCertificate {
            ver: SCHEMA_VERSION.into(),
            nam: Name {
                family: Some("Person".into()),
                fnt: "PERSON".into(),
                given: Some("Normal".into()),
                gnt: Some("NORMAL".into()),
            },
            dob: Some("1980-05-17".into()),
            v: Some(vec![VaccinationEntry {
                tg: "840539006".into(),
                vp: Some("1119349007".into()),
                mp: "EU/1/20/1507".into(),
                ma: "ORG-100031184".into(),
                dn: 2,
                sd: 2,
                dt: "2021-05-20".into(),
                co: "GB".into(),
                is: "NHS Digital".into(),
                ci: "URN:UVCI:01:GB:NHSX/V/ABC123#K".into(),
            }]),
            t: None,
            r: None,
            d: None,
        };
        CwtClaims::new(
            "GB",
            Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap(),
            certificate,
        )
    }

    #[test]
    fn roundtrip_preserves_claims() {
        let claims = claims();
        let signer = signer();
        let text = encode(&claims, &signer).expect("should encode");
        assert!(text.starts_with("HC1:"));

        let decoded = decode(&text).expect("should decode");
        assert_eq!(decoded.version, CURRENT_VERSION);
        assert_eq!(decoded.claims, claims);
        assert_eq!(decoded.key_id(), Some(signer.key_id().as_slice()));
    }

    #[test]
    fn encoding_is_deterministic() {
        let claims = claims();
        let signer = signer();
        assert_eq!(
            encode(&claims, &signer).expect("should encode"),
            encode(&claims, &signer).expect("should encode")
        );
    }

    #[test]
    fn payload_bytes_roundtrip() {
        let bytes = b"arbitrary envelope bytes".to_vec();
        let text = encode_payload(&bytes).expect("should armor");
        let (version, back) = decode_payload(&text).expect("should unarmor");
        assert_eq!(version, CURRENT_VERSION);
        assert_eq!(back, bytes);
    }

    #[test]
    fn signature_verifies_over_signature_input() {
        let signer = signer();
        let text = encode(&claims(), &signer).expect("should encode");
        let decoded = decode(&text).expect("should decode");

        let valid = hcert_keyring::verify(
            &signer.public_key_sec1(),
            &decoded.signature_input(),
            decoded.signature(),
        )
        .expect("valid key");
        assert!(valid);
    }

    #[test]
    fn unknown_version_fails_at_version_stage() {
        let text = encode(&claims(), &signer()).expect("should encode");
        let tampered = text.replacen("HC1:", "HC9:", 1);

        let err = decode(&tampered).expect_err("should fail");
        assert_eq!(err.stage(), "version");
        assert!(matches!(err, DecodeError::Version('9')));
    }

    #[test]
    fn prior_version_still_decodes() {
        let text = encode(&claims(), &signer()).expect("should encode");
        let prior = text.replacen("HC1:", "HC0:", 1);

        let decoded = decode(&prior).expect("one prior version stays decodable");
        assert_eq!(decoded.version, '0');
    }

    #[test]
    fn unknown_scheme_fails_at_prefix_stage() {
        let err = decode("XX1:ABC").expect_err("should fail");
        assert_eq!(err.stage(), "prefix");
    }

    #[test]
    fn corrupt_transport_fails_at_transport_stage() {
        let err = decode("HC1:not~base45~").expect_err("should fail");
        assert_eq!(err.stage(), "transport");
    }

    #[test]
    fn corrupt_compression_fails_at_inflate_stage() {
        let garbage = base45::encode(b"definitely not zlib");
        let err = decode(&format!("HC1:{garbage}")).expect_err("should fail");
        assert_eq!(err.stage(), "inflate");
    }

    #[test]
    fn non_cose_body_fails_at_binary_stage() {
        let body = cbor::to_vec(&"just a string".to_string()).expect("should encode");
        let text = encode_payload(&body).expect("should armor");
        let err = decode(&text).expect_err("should fail");
        assert_eq!(err.stage(), "binary");
    }

    #[test]
    fn decompression_bomb_rejected() {
        let huge = vec![0u8; MAX_INFLATED_LEN * 4];
        let text = encode_payload(&huge).expect("should armor");
        let err = decode_payload(&text).expect_err("should fail");
        assert_eq!(err.stage(), "inflate");
    }

    #[test]
    fn oversized_text_rejected_before_decoding() {
        let text = format!("HC1:{}", "0".repeat(MAX_PAYLOAD_CHARS + 10));
        let err = decode(&text).expect_err("should fail");
        assert_eq!(err.stage(), "transport");
    }
}
