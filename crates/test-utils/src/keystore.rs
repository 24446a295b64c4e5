//! In-memory secret store with fixed signing keys.

use hcert_keyring::{KeyStore, SigningContext};

/// Name of the primary test signing key.
pub const SIGNING_KEY_1: &str = "signing-key-1";

/// Name of the secondary test signing key.
pub const SIGNING_KEY_2: &str = "signing-key-2";

const SECRET_1: &str = "6c1382765aec5358f117733d281c1c7bdc39884d04a45a1e6c67c858bc206c19";
const SECRET_2: &str = "2a61a12b41c9c62f514fa61ed1a5f2d1a2ab83aa3deaf9d357ab9e5bbd3f5f08";

/// Key store resolving the two fixed test keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestKeyStore;

impl KeyStore for TestKeyStore {
    async fn signing_key(&self, key_name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let secret = match key_name {
            SIGNING_KEY_1 => SECRET_1,
            SIGNING_KEY_2 => SECRET_2,
            _ => return Ok(None),
        };
        Ok(Some(hex::decode(secret).expect("fixture hex is valid")))
    }
}

/// The signing context for a named test key, bypassing the ring.
///
/// # Panics
///
/// Panics on an unknown key name; fixtures are static.
#[must_use]
pub fn signing_context(key_name: &str) -> SigningContext {
    let secret = match key_name {
        SIGNING_KEY_1 => SECRET_1,
        SIGNING_KEY_2 => SECRET_2,
        other => panic!("unknown test key {other}"),
    };
    SigningContext::from_secret_bytes(&hex::decode(secret).expect("fixture hex is valid"))
        .expect("fixture key is valid")
}
