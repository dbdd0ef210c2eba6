//! Credential type tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// The closed set of credential types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// Opaque string.
    Value,
    /// Password, optionally generated.
    Password,
    /// X.509 certificate with optional private key.
    Certificate,
    /// RSA keypair.
    Rsa,
    /// SSH keypair.
    Ssh,
    /// Arbitrary JSON object.
    Json,
    /// Username and password.
    User,
}

impl CredentialType {
    /// All types, in tag order.
    pub const ALL: [CredentialType; 7] = [
        CredentialType::Value,
        CredentialType::Password,
        CredentialType::Certificate,
        CredentialType::Rsa,
        CredentialType::Ssh,
        CredentialType::Json,
        CredentialType::User,
    ];

    /// Stored tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Value => "value",
            CredentialType::Password => "password",
            CredentialType::Certificate => "certificate",
            CredentialType::Rsa => "rsa",
            CredentialType::Ssh => "ssh",
            CredentialType::Json => "json",
            CredentialType::User => "user",
        }
    }

    /// Whether versions of this type may carry generation parameters.
    pub fn is_generatable(&self) -> bool {
        matches!(self, CredentialType::Password | CredentialType::User)
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CredentialError::InvalidValue(format!("unknown credential type: {s}")))
    }
}
