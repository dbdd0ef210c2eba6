//! OS-backed randomness for keys, nonces and canary salts.

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::aead::{KEY_SIZE, NONCE_SIZE};

/// Size of the salt stored alongside passphrase-derived key canaries.
pub const SALT_SIZE: usize = 16;

fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// A fresh 256-bit key, wiped on drop.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut *key);
    key
}

/// A fresh AES-GCM nonce. Every seal call draws its own.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    random_array()
}

/// A fresh Argon2 salt for a new passphrase canary.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    random_array()
}
