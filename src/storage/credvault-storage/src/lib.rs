//! # Credvault Storage
//!
//! Persistence boundary for Credvault backends.
//!
//! Defines the row types that cross the boundary and the two store traits
//! a backend implements: one for key canaries, one for credential versions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod record;

pub use backend::{CanaryStore, CredentialStore};
pub use error::StorageError;
pub use record::{CanaryRecord, CredentialRecord, KdfParams, NameSummary};
