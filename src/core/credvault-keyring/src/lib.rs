//! # Credvault Key Ring
//!
//! Maps configured encryption key sources to the key canaries persisted in
//! the store, and exposes the [`Encryptor`] every credential write and read
//! goes through.
//!
//! ## Key classes
//!
//! - **active**: exactly one configured key; all new ciphertext uses it
//! - **known-inactive**: configured, decrypts its canary, no longer active
//! - **unknown**: a canary no configured key can decrypt
//!
//! The id of a key is the uuid of its canary. Ciphertext records that id,
//! so the key ring can always resolve which key to decrypt with.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod encryptor;
pub mod error;
pub mod keyring;

pub use config::{KeyRingConfig, KeySource, KeySourceConfig};
pub use encryptor::{Encryption, Encryptor};
pub use error::KeyRingError;
pub use keyring::{KeyRing, CANARY_VALUE};
