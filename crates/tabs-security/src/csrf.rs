//! Per-tab CSRF tokens.
//!
//! A token is `v1:<hex>` where `<hex>` is the SHA-256 digest of the server
//! secret, the session id and the tab id, each length-prefixed so that no two
//! distinct triples hash the same input. Verification compares digests in
//! constant time.

use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const TOKEN_PREFIX: &str = "v1:";
const DIGEST_LEN: usize = 32;

/// Issues and verifies tab-bound CSRF tokens.
#[derive(Clone)]
pub struct CsrfGuard {
    enabled: bool,
    secret: String,
}

impl fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl CsrfGuard {
    #[must_use]
    pub fn new(enabled: bool, secret: impl Into<String>) -> Self {
        Self {
            enabled,
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn digest(&self, tab_id: &str, session_id: &str) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        for part in [self.secret.as_str(), session_id, tab_id] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().into()
    }

    /// Token for `tab_id` in `session_id`. Empty when CSRF is disabled.
    #[must_use]
    pub fn token(&self, tab_id: &str, session_id: &str) -> String {
        if !self.enabled {
            return String::new();
        }
        format!("{TOKEN_PREFIX}{}", hex::encode(self.digest(tab_id, session_id)))
    }

    /// Whether `token` was issued for `tab_id` in `session_id`.
    ///
    /// Always true when CSRF is disabled. Missing or malformed tokens fail.
    #[must_use]
    pub fn verify(&self, token: &str, tab_id: &str, session_id: &str) -> bool {
        if !self.enabled {
            return true;
        }
        if token.is_empty() {
            tracing::warn!(tab_id, event = "csrf_token_missing", "tabs security event");
            return false;
        }

        let decoded = token
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|hex_part| hex::decode(hex_part).ok())
            .filter(|bytes| bytes.len() == DIGEST_LEN);
        let Some(provided) = decoded else {
            tracing::warn!(tab_id, event = "csrf_token_invalid_format", "tabs security event");
            return false;
        };

        let expected = self.digest(tab_id, session_id);
        if bool::from(provided.as_slice().ct_eq(&expected)) {
            true
        } else {
            tracing::warn!(tab_id, event = "csrf_mismatch", "tabs security event");
            false
        }
    }
}
