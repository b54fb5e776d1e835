//! # cb-identity
//!
//! Hash-based implementation of `IdentityProvider`.
//! Handles entity ids, derived creator identifiers and the ownership check
//! that gates deletion.

use std::time::{SystemTime, UNIX_EPOCH};

use cb_core::traits::IdentityProvider;
use sha2::{Digest, Sha256};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

pub struct SimpleIdentityProvider {
    /// Secret salt for deriving creator ids from client addresses
    session_salt: String,
}

impl SimpleIdentityProvider {
    /// Accepts a salt string (e.g., from configuration)
    pub fn new(salt: &str) -> Self {
        Self {
            session_salt: salt.to_string(),
        }
    }

    /// Random base36 characters. Falls back to hashing the clock if the OS
    /// source is unavailable; the result then stays unique but not secret.
    fn random_suffix(&self) -> String {
        let mut bytes = [0u8; SUFFIX_LEN];
        if let Err(err) = getrandom::getrandom(&mut bytes) {
            log::warn!("OS randomness unavailable, deriving id suffix from the clock: {err}");
            let mut hasher = Sha256::new();
            hasher.update(self.session_salt.as_bytes());
            hasher.update(now_nanos().to_le_bytes());
            bytes.copy_from_slice(&hasher.finalize()[..SUFFIX_LEN]);
        }
        bytes
            .iter()
            .map(|b| BASE36[(*b as usize) % BASE36.len()] as char)
            .collect()
    }
}

impl IdentityProvider for SimpleIdentityProvider {
    /// `<unix millis>_<9 base36 chars>`, e.g. `1718000000000_k3j9x0a1b`.
    fn new_entity_id(&self) -> String {
        format!("{}_{}", now_nanos() / 1_000_000, self.random_suffix())
    }

    /// Derives a creator id (e.g. `user_3fa9c2d10b7e4411`) for clients that
    /// did not report one. Stable for a given address while the salt is kept.
    fn derive_creator_id(&self, client_addr: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.session_salt.as_bytes());
        hasher.update(client_addr.as_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("user_{}", &hash[..16])
    }

    /// Both sides must be present and equal. Entities stored without a
    /// creator can never be deleted.
    fn verify_creator(&self, stored: Option<&str>, supplied: Option<&str>) -> bool {
        match (stored, supplied) {
            (Some(stored), Some(supplied)) => !stored.is_empty() && stored == supplied,
            _ => false,
        }
    }
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
