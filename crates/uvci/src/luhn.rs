//! Luhn mod-N check characters over the uppercase alphanumeric alphabet.

/// The 36-character alphabet check characters are drawn from.
pub const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const N: u32 = 36;

/// Compute the Luhn mod-36 check character for `input`.
///
/// Characters outside the alphabet (separators such as `:` and `/`) do not
/// participate in the sum, so the check survives reformatting that only
/// touches separators.
#[must_use]
pub fn checksum(input: &str) -> char {
    let mut factor = 2;
    let mut sum = 0;
    for code in input.chars().rev().filter_map(index) {
        let addend = factor * code;
        factor = if factor == 2 { 1 } else { 2 };
        sum += addend / N + addend % N;
    }
    let check = (N - sum % N) % N;
    char::from(ALPHABET[check as usize])
}

/// `true` when `check` is the check character for `input`.
#[must_use]
pub fn validate(input: &str, check: char) -> bool {
    checksum(input) == check
}

fn index(c: char) -> Option<u32> {
    u8::try_from(c)
        .ok()
        .and_then(|b| ALPHABET.iter().position(|&a| a == b))
        .and_then(|p| u32::try_from(p).ok())
}
