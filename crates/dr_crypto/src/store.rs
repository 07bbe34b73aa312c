//! Skipped-message-key store.
//!
//! Logical type: `(remote_dh_pubkey, msg_num) -> message_key`. The core is
//! generic over this surface so an embedder can swap in a persistent
//! implementation (own I/O, own errors) behind the same trait; the
//! in-memory implementation here is the only one the core itself needs.

use std::collections::HashMap;

use x25519_dalek::PublicKey;
use zeroize::Zeroize;

use crate::error::RatchetError;

/// `(remote_dh_pubkey, msg_num) -> message_key`.
pub trait SkippedKeyStore {
    /// Returns the cached key, or `None` if absent. Never errors on a miss.
    fn get(&mut self, pubkey: &PublicKey, n: u32) -> Result<Option<[u8; 32]>, RatchetError>;

    /// Insert, overwriting any prior entry at the same coordinates.
    fn save(&mut self, pubkey: &PublicKey, n: u32, mk: [u8; 32]) -> Result<(), RatchetError>;

    /// Remove; no-op if absent.
    fn delete(&mut self, pubkey: &PublicKey, n: u32) -> Result<(), RatchetError>;
}

/// Canonical hex encoding of a public key, used as the outer map key so the
/// store doesn't need `PublicKey` to implement `Hash`.
fn canonical(pubkey: &PublicKey) -> String {
    hex::encode(pubkey.as_bytes())
}

/// Two-level in-memory store: outer map keyed by canonical (hex) public key,
/// inner map keyed by message number. The outer entry is removed once its
/// inner map becomes empty, matching the store's stated eviction behavior.
#[derive(Default)]
pub struct InMemorySkippedKeyStore {
    keys: HashMap<String, HashMap<u32, [u8; 32]>>,
}

impl InMemorySkippedKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of cached message keys across all peers.
    pub fn len(&self) -> usize {
        self.keys.values().map(|inner| inner.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InMemorySkippedKeyStore {
    fn drop(&mut self) {
        for inner in self.keys.values_mut() {
            for mk in inner.values_mut() {
                mk.zeroize();
            }
        }
    }
}

impl SkippedKeyStore for InMemorySkippedKeyStore {
    fn get(&mut self, pubkey: &PublicKey, n: u32) -> Result<Option<[u8; 32]>, RatchetError> {
        let index = canonical(pubkey);
        Ok(self.keys.get(&index).and_then(|inner| inner.get(&n)).copied())
    }

    fn save(&mut self, pubkey: &PublicKey, n: u32, mk: [u8; 32]) -> Result<(), RatchetError> {
        let index = canonical(pubkey);
        self.keys.entry(index).or_default().insert(n, mk);
        Ok(())
    }

    fn delete(&mut self, pubkey: &PublicKey, n: u32) -> Result<(), RatchetError> {
        let index = canonical(pubkey);
        if let Some(inner) = self.keys.get_mut(&index) {
            if let Some(mut mk) = inner.remove(&n) {
                mk.zeroize();
            }
            if inner.is_empty() {
                self.keys.remove(&index);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::{DhKeyPair, SoftwareDhKeyPair};

    #[test]
    fn get_miss_then_hit_then_miss() {
        let mut store = InMemorySkippedKeyStore::new();
        let kp = SoftwareDhKeyPair::generate().unwrap();
        let pub_key = kp.public_key();

        assert_eq!(store.get(&pub_key, 3).unwrap(), None);
        store.save(&pub_key, 3, [9u8; 32]).unwrap();
        assert_eq!(store.get(&pub_key, 3).unwrap(), Some([9u8; 32]));

        store.delete(&pub_key, 3).unwrap();
        assert_eq!(store.get(&pub_key, 3).unwrap(), None);
    }

    #[test]
    fn outer_entry_evicted_when_emptied() {
        let mut store = InMemorySkippedKeyStore::new();
        let kp = SoftwareDhKeyPair::generate().unwrap();
        let pub_key = kp.public_key();

        store.save(&pub_key, 0, [1u8; 32]).unwrap();
        assert_eq!(store.len(), 1);
        store.delete(&pub_key, 0).unwrap();
        assert!(store.is_empty());
        assert!(store.keys.is_empty());
    }

    #[test]
    fn delete_of_absent_entry_is_noop() {
        let mut store = InMemorySkippedKeyStore::new();
        let kp = SoftwareDhKeyPair::generate().unwrap();
        store.delete(&kp.public_key(), 42).unwrap();
    }

    #[test]
    fn save_overwrites_existing() {
        let mut store = InMemorySkippedKeyStore::new();
        let kp = SoftwareDhKeyPair::generate().unwrap();
        let pub_key = kp.public_key();

        store.save(&pub_key, 5, [1u8; 32]).unwrap();
        store.save(&pub_key, 5, [2u8; 32]).unwrap();
        assert_eq!(store.get(&pub_key, 5).unwrap(), Some([2u8; 32]));
    }
}
