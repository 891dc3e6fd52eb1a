//! Identifier vault: opaque tokens for sensitive identifiers.
//!
//! Pool names, dataset names and paths can contain characters that are not
//! safe to take back from a web client. Instead of sanitizing them, every
//! identifier that leaves the process is replaced by a token, and every
//! token that comes back is resolved through this table. A token that was
//! never minted resolves to nothing, so a client can only ever point at
//! identifiers the server has already shown it.
//!
//! # Security model
//!
//! - Tokens are the hex HMAC-SHA256 of the identifier under the installation
//!   session key, so they cannot be forged for unseen identifiers.
//! - Tokens are not secrets. Lookups are plain hash-map reads and are not
//!   constant-time.
//! - Entries are never evicted. The table is bounded by the number of
//!   distinct identifiers the server has ever displayed.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::VaultError;

type HmacSha256 = Hmac<Sha256>;

/// Length in characters of every minted token.
pub const TOKEN_LEN: usize = 64;

/// Maps tokens to the identifiers they stand for.
pub struct IdentifierVault {
    /// Keyed MAC prototype, cloned for every mint.
    mac: HmacSha256,
    entries: RwLock<HashMap<String, String>>,
}

impl IdentifierVault {
    /// Create an empty vault keyed with the installation session key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EmptyKey`] if `key` is empty.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.is_empty() {
            return Err(VaultError::EmptyKey);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| VaultError::EmptyKey)?;
        Ok(Self {
            mac,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Return the token for `plaintext`, registering it if it is new.
    ///
    /// Deterministic: the same plaintext always yields the same token.
    pub fn mint(&self, plaintext: &str) -> String {
        let token = self.token_for(plaintext);

        let known = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&token);
        if !known {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(token.clone())
                .or_insert_with(|| plaintext.to_owned());
        }

        token
    }

    /// Look up the identifier behind `token`.
    ///
    /// Returns `None` for any token this vault did not mint.
    pub fn resolve(&self, token: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no identifier has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn token_for(&self, plaintext: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for IdentifierVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierVault")
            .field("key", &"[REDACTED]")
            .field("entries", &self.len())
            .finish()
    }
}
