//! HTTP Basic credential parsing and verification.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::config::Config;

/// Username/password pair taken from an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Parse the value of an `Authorization` header.
    ///
    /// Returns `None` unless it is `Basic <base64(user:pass)>`.
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Check credentials against the configured publisher account.
pub fn authenticate(config: &Config, credentials: &Credentials) -> bool {
    // Evaluate both so timing does not reveal which half mismatched.
    let username_ok = digest_eq(&credentials.username, &config.auth_username);
    let password_ok = digest_eq(&credentials.password, &config.auth_password);
    username_ok & password_ok
}

/// Constant-time comparison over SHA-256 digests (equal length regardless of input).
fn digest_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
