//! Plaintext payloads accepted by the credential factory.

use serde_json::Value as JsonValue;

use crate::types::CredentialType;

/// The plaintext content of a new credential version.
#[derive(Clone, PartialEq)]
pub enum CredentialValue {
    /// Opaque string.
    Value(String),
    /// JSON object.
    Json(JsonValue),
    /// Password.
    Password(String),
    /// Username and password.
    User {
        /// Optional username, stored in cleartext.
        username: Option<String>,
        /// Password, encrypted.
        password: String,
    },
    /// Certificate material. Only the private key is encrypted.
    Certificate {
        /// CA certificate PEM.
        ca: Option<String>,
        /// Certificate PEM.
        certificate: Option<String>,
        /// Private key PEM.
        private_key: Option<String>,
        /// Name of the signing CA credential.
        ca_name: Option<String>,
    },
    /// RSA keypair.
    Rsa {
        /// Public key PEM.
        public_key: Option<String>,
        /// Private key PEM.
        private_key: Option<String>,
    },
    /// SSH keypair.
    Ssh {
        /// Public key in `authorized_keys` format.
        public_key: Option<String>,
        /// Private key PEM.
        private_key: Option<String>,
    },
}

impl CredentialValue {
    /// Type tag this payload produces.
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialValue::Value(_) => CredentialType::Value,
            CredentialValue::Json(_) => CredentialType::Json,
            CredentialValue::Password(_) => CredentialType::Password,
            CredentialValue::User { .. } => CredentialType::User,
            CredentialValue::Certificate { .. } => CredentialType::Certificate,
            CredentialValue::Rsa { .. } => CredentialType::Rsa,
            CredentialValue::Ssh { .. } => CredentialType::Ssh,
        }
    }
}

impl std::fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialValue")
            .field("type", &self.credential_type())
            .field("value", &"[REDACTED]")
            .finish()
    }
}
