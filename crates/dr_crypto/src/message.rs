//! Message header framing.
//!
//! Wire layout (40 bytes, all integers little-endian):
//! `N (4) ∥ PN (4) ∥ DH (32)`.

use x25519_dalek::PublicKey;

use crate::dh::decode_public_key;
use crate::error::RatchetError;

pub const HEADER_LEN: usize = 40;

/// Sent alongside every ciphertext, in the clear. Carries enough state for
/// the recipient to advance its DH ratchet and chain.
#[derive(Debug, Clone)]
pub struct Header {
    /// Sender's current DH ratchet public key.
    pub dh: PublicKey,
    /// Message number in the sender's current sending chain.
    pub n: u32,
    /// Length of the sender's previous sending chain.
    pub pn: u32,
}

impl Header {
    pub fn new(dh: PublicKey, n: u32, pn: u32) -> Self {
        Self { dh, n, pn }
    }

    /// Encode to the 40-byte wire representation.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.n.to_le_bytes());
        buf[4..8].copy_from_slice(&self.pn.to_le_bytes());
        buf[8..40].copy_from_slice(self.dh.as_bytes());
        buf
    }

    /// Decode from a byte slice. Requires exactly 40 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, RatchetError> {
        if bytes.len() != HEADER_LEN {
            return Err(RatchetError::Message(format!(
                "invalid header length: expected {HEADER_LEN}, got {}",
                bytes.len()
            )));
        }
        let n = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let pn = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let dh = decode_public_key(&bytes[8..40])?;
        Ok(Self { dh, n, pn })
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n && self.pn == other.pn && self.dh.as_bytes() == other.dh.as_bytes()
    }
}

impl Eq for Header {}

/// `{ Header, Ciphertext }`. The core produces and consumes these; the
/// wire framing of a full `Message` is the embedder's choice, though the
/// concatenation below (`header ∥ ciphertext`) is what spec §6 describes
/// and is convenient for callers who don't need a richer envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    // Derived PartialEq/Eq here rely on Header's manual impl above and
    // Vec<u8>'s built-in one.
    pub header: Header,
    pub ciphertext: Vec<u8>,
}

impl Message {
    pub fn new(header: Header, ciphertext: Vec<u8>) -> Self {
        Self { header, ciphertext }
    }

    /// `Header::encode() ∥ ciphertext`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Inverse of `to_wire`. Requires at least `HEADER_LEN` bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, RatchetError> {
        if bytes.len() < HEADER_LEN {
            return Err(RatchetError::Message(format!(
                "wire message shorter than header: {} bytes",
                bytes.len()
            )));
        }
        let header = Header::decode(&bytes[..HEADER_LEN])?;
        let ciphertext = bytes[HEADER_LEN..].to_vec();
        Ok(Self { header, ciphertext })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh::{DhKeyPair, SoftwareDhKeyPair};

    #[test]
    fn header_round_trip() {
        let kp = SoftwareDhKeyPair::generate().unwrap();
        let h = Header::new(kp.public_key(), 7, 3);
        let encoded = h.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Header::decode(&[0u8; 39]).is_err());
        assert!(Header::decode(&[0u8; 41]).is_err());
    }

    #[test]
    fn message_wire_round_trip() {
        let kp = SoftwareDhKeyPair::generate().unwrap();
        let msg = Message::new(Header::new(kp.public_key(), 0, 0), vec![1, 2, 3, 4]);
        let wire = msg.to_wire();
        assert_eq!(wire.len(), HEADER_LEN + 4);
        let back = Message::from_wire(&wire).unwrap();
        assert_eq!(back, msg);
    }
}
