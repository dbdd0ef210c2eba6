//! # Credvault Rotation
//!
//! Re-encrypts credential versions sealed under known-inactive keys so that
//! everything ends up under the active key.
//!
//! A pass walks the store in pages ordered by version id. Each version is
//! decrypted with its old key, sealed again under the active key and saved
//! on its own. Versions whose key is not configured are skipped and left
//! exactly as they are.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod report;
pub mod rotator;

pub use error::RotationError;
pub use report::{RecordOutcome, RotationReport, SkipReason};
pub use rotator::{KeyRotator, DEFAULT_BATCH_SIZE};
