//! Credential names.
//!
//! A name is a `/`-separated path. The leading `/` is added when missing
//! and lookups ignore case. The name uuid is the identity shared by every
//! version of a credential.

use uuid::Uuid;

use crate::error::CredentialError;

/// Maximum length of a normalized name.
pub const MAX_NAME_LENGTH: usize = 1024;

/// The identity shared by every version of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialName {
    uuid: Uuid,
    name: String,
}

impl CredentialName {
    /// Creates a new name identity after normalizing and validating `name`.
    pub fn new(name: &str) -> Result<Self, CredentialError> {
        let name = normalize(name);
        validate(&name)?;

        Ok(Self {
            uuid: Uuid::new_v4(),
            name,
        })
    }

    /// Rebuilds a stored name identity.
    pub(crate) fn from_parts(uuid: Uuid, name: String) -> Self {
        Self { uuid, name }
    }

    /// Name id.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Normalized name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for CredentialName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Prepends `/` when missing.
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Validates a normalized name.
pub fn validate(name: &str) -> Result<(), CredentialError> {
    if name.len() <= 1 {
        return Err(CredentialError::InvalidName("name cannot be empty".into()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(CredentialError::InvalidName(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }

    if name.contains("//") {
        return Err(CredentialError::InvalidName(format!(
            "{name}: empty path segment"
        )));
    }

    if name.ends_with('/') {
        return Err(CredentialError::InvalidName(format!(
            "{name}: cannot end with '/'"
        )));
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));

    if !valid {
        return Err(CredentialError::InvalidName(format!(
            "{name}: must match [A-Za-z0-9/._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_slash_added() {
        assert_eq!(normalize("app/db"), "/app/db");
        assert_eq!(normalize("/app/db"), "/app/db");
        assert_eq!(CredentialName::new("app").unwrap().name(), "/app");
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "/", "/a//b", "/a/", "/has space", "/semi;colon"] {
            assert!(
                matches!(CredentialName::new(name), Err(CredentialError::InvalidName(_))),
                "should reject name: {name:?}"
            );
        }
    }

    #[test]
    fn test_new_names_get_fresh_ids() {
        let a = CredentialName::new("/same").unwrap();
        let b = CredentialName::new("/same").unwrap();
        assert_ne!(a.uuid(), b.uuid());
    }
}
