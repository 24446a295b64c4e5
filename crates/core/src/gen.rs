//! # Generate
//!
//! Random string generation for identifier suffixes.

use rand::Rng;

/// Characters permitted in identifier suffixes. Restricted to the uppercase
/// alphanumeric set so generated identifiers survive optical transports and
/// checksum alphabets.
pub const SUFFIX_CHARS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random identifier suffix of the given length.
#[must_use]
pub fn suffix(len: usize) -> String {
    random_string(len, SUFFIX_CHARS)
}

// Generates a random string from a given set of characters.
fn random_string(len: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    let mut rng = rand::thread_rng();
    (0..len).map(|_| chars[rng.gen_range(0..chars.len())]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_uses_charset() {
        let s = suffix(12);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| SUFFIX_CHARS.contains(c)));
    }
}
