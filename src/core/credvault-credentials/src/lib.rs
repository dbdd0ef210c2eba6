//! # Credvault Credentials
//!
//! Versioned, encrypted credentials.
//!
//! ## Features
//!
//! - Seven credential types sharing one encrypted envelope
//! - Lazy decryption: secrets are only opened when an accessor is called
//! - Type immutability across the versions of a name
//! - Password and user generation with regenerable parameters
//! - RSA and SSH keypair generation
//! - In-place re-encryption for key rotation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod data_service;
pub mod error;
pub mod factory;
pub mod generator;
pub mod keypair;
pub mod name;
pub mod params;
mod record;
pub mod service;
pub mod types;
pub mod value;
pub mod version;

pub use data_service::CredentialDataService;
pub use error::CredentialError;
pub use factory::CredentialFactory;
pub use name::CredentialName;
pub use params::StringGenerationParameters;
pub use service::{CertificateAuthority, CredentialService};
pub use types::CredentialType;
pub use value::CredentialValue;
pub use version::{CredentialKind, CredentialVersion, EncryptedField};
