//! One-way hashing for secrets.
//!
//! Two algorithms, never interchanged:
//! - SHA-256 for high-entropy random tokens (refresh sessions, single-use
//!   tokens, API keys), so they can be looked up through an index;
//! - bcrypt for human-chosen passwords.

use rand::{Rng, rng};
use sha2::{Digest, Sha256};

use super::AuthError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Longest password bcrypt hashes without truncation.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Password hasher configured with a fixed bcrypt cost.
#[derive(Debug, Clone, Copy)]
pub struct SecretHasher {
    bcrypt_cost: u32,
}

impl SecretHasher {
    pub fn new(bcrypt_cost: u32) -> Self {
        Self { bcrypt_cost }
    }

    /// Hash a password with bcrypt.
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::ValidationError(format!(
                "Password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }
        bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Verify a password against a bcrypt hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash)
            .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
    }
    /// Password check for an account that does not exist. Always `false`, at
    /// the same bcrypt cost as a real [`Self::verify_password`].
    pub fn verify_missing_account(&self, password: &str) -> bool {
        let truncated = &password.as_bytes()[..password.len().min(MAX_PASSWORD_BYTES)];
        let _ = bcrypt::hash(truncated, self.bcrypt_cost);
        false
    }
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

/// SHA-256 digest of a high-entropy secret, hex encoded.
///
/// Deterministic so the digest can be used as an index key. Only suitable for
/// inputs produced by [`random_hex`]; passwords go through bcrypt.
pub fn lookup_digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `n_bytes` of CSPRNG output, hex encoded (`2 * n_bytes` chars).
pub fn random_hex(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rng().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}
