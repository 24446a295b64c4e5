//! CBOR serialization helpers.

use std::io::Cursor;

use anyhow::anyhow;
use serde::de::DeserializeOwned;

/// Serialize a value to CBOR bytes.
///
/// Serialization is deterministic for the types this crate writes: struct
/// fields encode in declaration order and claim maps are built with a fixed
/// key sequence.
///
/// # Errors
///
/// Returns an error when the value cannot be represented as CBOR.
pub fn to_vec<T>(value: &T) -> anyhow::Result<Vec<u8>>
where
    T: serde::Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error when the bytes are not well-formed CBOR for `T`.
pub fn from_slice<T>(slice: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(&slice)).map_err(|e| anyhow!("cbor decode failed: {e}"))
}
