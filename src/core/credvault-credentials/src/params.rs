//! Password generation parameters.
//!
//! Only the flags are persisted, and only when set:
//! `{"exclude_lower":true,"include_special":true}`. The length is never
//! stored; it is recovered from the decrypted password.

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Parameters a password (or user password) was generated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringGenerationParameters {
    /// Password length. `None` means the generator default.
    #[serde(skip)]
    pub length: Option<usize>,
    /// Omit lowercase letters.
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude_lower: bool,
    /// Omit uppercase letters.
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude_upper: bool,
    /// Omit digits.
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude_number: bool,
    /// Add punctuation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_special: bool,
}

impl StringGenerationParameters {
    /// Persisted JSON form.
    pub fn to_json(&self) -> Result<String, CredentialError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        Ok(serde_json::from_str(json)?)
    }
}
