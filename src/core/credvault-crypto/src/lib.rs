//! # Credvault Crypto
//!
//! Core cryptographic primitives for Credvault.
//!
//! This crate provides the low-level operations every stored credential
//! relies on:
//! - Authenticated encryption with a detached nonce (AES-256-GCM)
//! - Key derivation (HKDF-SHA256 for key material, Argon2id for passphrases)
//! - Secure random generation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;

pub use aead::Sealed;
pub use error::CryptoError;
pub use kdf::Argon2Params;
pub use keys::SymmetricKey;
