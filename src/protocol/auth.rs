//! PostgreSQL MD5 password authentication
//!
//! The proxy speaks MD5 challenge-response on both legs: it answers the
//! upstream's challenge with the service account credentials and verifies
//! the client's response against the proxy's own user table.
//!
//! Reference: <https://www.postgresql.org/docs/current/auth-password.html>

use md5::{Digest as Md5Digest, Md5};

/// Compute the MD5 password digest for PostgreSQL authentication.
///
/// The PostgreSQL MD5 password format is:
/// `"md5" + md5(md5(password + user) + salt)`
///
/// # Example
///
/// ```
/// use pgfence_proxy::protocol::auth::compute_md5_password;
///
/// let digest = compute_md5_password("user", "password", &[0x01, 0x02, 0x03, 0x04]);
/// assert!(digest.starts_with("md5"));
/// assert_eq!(digest.len(), 35); // "md5" + 32 hex chars
/// ```
pub fn compute_md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    // Stage 1: md5(password + user)
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let stage1 = hex_encode(&hasher.finalize());

    // Stage 2: md5(stage1_hex + salt)
    let mut hasher = Md5::new();
    hasher.update(stage1.as_bytes());
    hasher.update(salt);
    format!("md5{}", hex_encode(&hasher.finalize()))
}

/// Check a client-supplied digest against the expected credentials for the
/// challenge salt the client answered.
pub fn verify_md5_password(user: &str, password: &str, salt: &[u8; 4], digest: &str) -> bool {
    compute_md5_password(user, password, salt) == digest
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
