//! X25519 Diffie-Hellman.
//!
//! `GenerateDH` samples a fresh keypair from the process CSPRNG; clamping
//! per RFC 7748 §5 (low three bits of byte 0 cleared, high bit of byte 31
//! cleared, second-highest bit of byte 31 set) is performed internally by
//! `x25519_dalek::StaticSecret`.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::RatchetError;

/// Capability a DH ratchet keypair must provide. A trait rather than a
/// concrete struct so a future hardware-token-backed keypair can slot in
/// without touching the state machine.
pub trait DhKeyPair: Sized {
    /// Generate a fresh keypair from the CSPRNG.
    fn generate() -> Result<Self, RatchetError>;

    /// This keypair's public half.
    fn public_key(&self) -> PublicKey;

    /// Diffie-Hellman with a peer's public key. Rejects nothing by
    /// construction — `PublicKey` is always exactly 32 bytes.
    fn diffie_hellman(&self, peer_public: &PublicKey) -> [u8; 32];
}

/// Software X25519 keypair, backed by `x25519_dalek::StaticSecret`. The
/// private scalar is zeroized on drop by `StaticSecret` itself.
pub struct SoftwareDhKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DhKeyPair for SoftwareDhKeyPair {
    fn generate() -> Result<Self, RatchetError> {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    fn public_key(&self) -> PublicKey {
        self.public
    }

    fn diffie_hellman(&self, peer_public: &PublicKey) -> [u8; 32] {
        *self.secret.diffie_hellman(peer_public).as_bytes()
    }
}

impl SoftwareDhKeyPair {
    /// Build a keypair from an already-generated secret, used by
    /// `RatchetInitBob` where the caller supplies the initial ratchet key
    /// (e.g. the signed prekey secret from the handshake layer).
    pub fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }
}

/// Decode a 32-byte X25519 public key from a wire slice. Rejects any length
/// other than 32, per the DH primitive's stated length discipline.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, RatchetError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RatchetError::Message(format!("invalid DH public key length: {}", bytes.len())))?;
    Ok(PublicKey::from(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement_matches() {
        let a = SoftwareDhKeyPair::generate().unwrap();
        let b = SoftwareDhKeyPair::generate().unwrap();

        let shared_a = a.diffie_hellman(&b.public_key());
        let shared_b = b.diffie_hellman(&a.public_key());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn rejects_short_public_key() {
        assert!(decode_public_key(&[0u8; 31]).is_err());
    }
}
