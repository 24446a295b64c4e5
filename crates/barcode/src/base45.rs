//! # Base45 Transport Encoding
//!
//! RFC 9285 encoding over the 45-character QR alphanumeric alphabet.
//! Uppercase-biased and free of characters that confuse optical scanners,
//! which is why barcode payloads ride on it rather than base64.
//!
//! Two input bytes become three output characters (little-endian base-45
//! digits of `a * 256 + b`); a trailing single byte becomes two characters.

use thiserror::Error;

const ALPHABET: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// Base45 decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Base45Error {
    /// A character outside the 45-character alphabet.
    #[error("character {0:?} is not in the Base45 alphabet")]
    InvalidCharacter(char),

    /// An input length of `3n + 1` can never be produced by the encoder.
    #[error("invalid Base45 length")]
    InvalidLength,

    /// A chunk decodes to a value too large for its byte width.
    #[error("Base45 chunk overflows its byte width")]
    Overflow,
}

/// Encode bytes as Base45 text.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() / 2 * 3 + 2);
    for chunk in data.chunks(2) {
        match *chunk {
            [a, b] => {
                let n = u32::from(a) * 256 + u32::from(b);
                out.push(char::from(ALPHABET[(n % 45) as usize]));
                out.push(char::from(ALPHABET[(n / 45 % 45) as usize]));
                out.push(char::from(ALPHABET[(n / (45 * 45)) as usize]));
            }
            [a] => {
                let n = u32::from(a);
                out.push(char::from(ALPHABET[(n % 45) as usize]));
                out.push(char::from(ALPHABET[(n / 45) as usize]));
            }
            _ => unreachable!("chunks(2) yields one or two bytes"),
        }
    }
    out
}

/// Decode Base45 text back to bytes.
///
/// # Errors
///
/// Returns a [`Base45Error`] for characters outside the alphabet, an
/// impossible length, or a chunk whose value exceeds its byte width.
pub fn decode(text: &str) -> Result<Vec<u8>, Base45Error> {
    let digits = text
        .chars()
        .map(|c| {
            u8::try_from(c)
                .ok()
                .and_then(|b| ALPHABET.iter().position(|&a| a == b))
                .map(|p| p as u32)
                .ok_or(Base45Error::InvalidCharacter(c))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if digits.len() % 3 == 1 {
        return Err(Base45Error::InvalidLength);
    }

    let mut out = Vec::with_capacity(digits.len() / 3 * 2 + 1);
    for chunk in digits.chunks(3) {
        match *chunk {
            [c, d, e] => {
                let n = c + d * 45 + e * 45 * 45;
                if n > 0xFFFF {
                    return Err(Base45Error::Overflow);
                }
                out.push((n / 256) as u8);
                out.push((n % 256) as u8);
            }
            [c, d] => {
                let n = c + d * 45;
                if n > 0xFF {
                    return Err(Base45Error::Overflow);
                }
                out.push(n as u8);
            }
            _ => unreachable!("length 3n + 1 rejected above"),
        }
    }
    Ok(out)
}
