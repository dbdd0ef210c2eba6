//! Outcome types for a rotation pass.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

/// Why a version was left under its old key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The version references a key this instance is not configured with.
    KeyNotFound(Uuid),
    /// The ciphertext did not authenticate under its key.
    AuthenticationFailure(Uuid),
    /// Sealing under the active key failed.
    Encryption(String),
    /// The version was deleted after it was read.
    Deleted(Uuid),
    /// The re-encrypted version could not be saved.
    Storage(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::KeyNotFound(id) => write!(f, "encryption key {id} not found"),
            SkipReason::AuthenticationFailure(id) => {
                write!(f, "authentication failed under key {id}")
            },
            SkipReason::Encryption(e) => write!(f, "re-encryption failed: {e}"),
            SkipReason::Deleted(id) => write!(f, "version {id} was deleted"),
            SkipReason::Storage(e) => write!(f, "save failed: {e}"),
        }
    }
}

/// Result of rotating one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Saved under the active key.
    Rotated,
    /// Left untouched.
    Skipped {
        /// What went wrong.
        reason: SkipReason,
    },
}

/// Summary of a rotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Versions now sealed under the active key.
    pub rotated: u64,
    /// Versions that could not be rotated.
    pub skipped: u64,
    /// Versions still not under the active key after the pass, including
    /// those under unknown keys.
    pub remaining: u64,
    /// Canaries deleted after the pass.
    pub pruned_canaries: u64,
    /// Whether the pass stopped early on request.
    pub cancelled: bool,
    /// Wall time of the pass.
    pub duration: Duration,
}
