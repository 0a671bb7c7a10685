//! Credential rules and password hashing shared by the shipped auth
//! backends.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AuthErrorKind, Error, Result};

/// Shortest password the shipped backends accept
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Salt length in bytes
const SALT_LEN: usize = 16;

/// Canonical form used for email lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Reject addresses without a local part and a domain
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(Error::auth(
            AuthErrorKind::InvalidEmail,
            format!("The email address {:?} is badly formatted.", email),
        )),
    }
}

/// Reject passwords shorter than [`MIN_PASSWORD_LENGTH`]
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::auth(
            AuthErrorKind::WeakPassword,
            format!(
                "Password should be at least {} characters.",
                MIN_PASSWORD_LENGTH
            ),
        ));
    }
    Ok(())
}

/// A salted SHA-256 password digest, both parts hex encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    /// Random per-credential salt
    pub salt: String,
    /// SHA-256(salt || password)
    pub digest: String,
}

impl HashedPassword {
    /// Hash a password under a fresh random salt
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let digest = digest(&salt, password);
        Self { salt, digest }
    }

    /// Rebuild from stored parts
    pub fn from_parts(salt: String, digest: String) -> Self {
        Self { salt, digest }
    }

    /// Check a candidate password
    pub fn verify(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.digest
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// The refusal returned for any bad email/password pair
pub(crate) fn invalid_credentials() -> Error {
    Error::auth(
        AuthErrorKind::InvalidCredentials,
        "The password is invalid or the user does not have a password.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verifies_only_original_password() {
        let hashed = HashedPassword::new("hunter22");
        assert!(hashed.verify("hunter22"));
        assert!(!hashed.verify("hunter23"));
    }

    #[test]
    fn test_salts_differ() {
        let a = HashedPassword::new("same-password");
        let b = HashedPassword::new("same-password");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@").is_err());
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_password_rules() {
        let err = validate_password("12345").unwrap_err();
        assert!(matches!(
            err,
            Error::Auth {
                kind: AuthErrorKind::WeakPassword,
                ..
            }
        ));
        assert!(validate_password("123456").is_ok());
    }
}
