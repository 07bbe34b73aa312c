//! Root-key KDF, chain-key KDF, and message-key expansion.
//!
//! Both HKDF info strings below are part of the wire-protocol contract and
//! must never change without breaking compatibility with peers.
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::RatchetError;

const ROOT_KDF_INFO: &[u8] = b"rsZUpEuXUqqwXBvSy3EcievAh4cMj6QL";
const MESSAGE_KDF_INFO: &[u8] = b"pcwSByyx2CRdryCffXJwy7xgVZWtW5Sh";

type HmacSha256 = Hmac<Sha256>;

/// `KdfRK(rk, dhOut)` — root KDF. IKM is the DH output, salt is the current
/// root key. Expands 64 bytes: the first 32 become the new root key, the
/// next 32 the new chain key. No header key is derived — header encryption
/// is not part of this core (see spec §4.1 and the Open Question it
/// resolves in favour of the 64-byte form).
pub fn kdf_rk(rk: &[u8; 32], dh_output: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), RatchetError> {
    let hk = Hkdf::<Sha256>::new(Some(rk), dh_output);
    let mut okm = [0u8; 64];
    hk.expand(ROOT_KDF_INFO, &mut okm)
        .map_err(|e| RatchetError::Crypto(format!("KdfRK expand failed: {e}")))?;

    let mut new_rk = [0u8; 32];
    let mut new_ck = [0u8; 32];
    new_rk.copy_from_slice(&okm[..32]);
    new_ck.copy_from_slice(&okm[32..]);
    Ok((new_rk, new_ck))
}

/// `KdfCK(ck)` — chain KDF. Two independent HMAC-SHA256 calls keyed by the
/// chain key: `HMAC(ck, 0x01)` is the next chain key, `HMAC(ck, 0x02)` is
/// the message key. These constants are fixed per the Open Question
/// resolution (spec §9.1) — the alternate `{0x0F, 0x10}` variant is not
/// used here.
pub fn kdf_ck(ck: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), RatchetError> {
    let mut mac_ck = HmacSha256::new_from_slice(ck)
        .map_err(|e| RatchetError::Crypto(format!("KdfCK keying failed: {e}")))?;
    mac_ck.update(&[0x01]);
    let new_ck: [u8; 32] = mac_ck.finalize().into_bytes().into();

    let mut mac_mk = HmacSha256::new_from_slice(ck)
        .map_err(|e| RatchetError::Crypto(format!("KdfCK keying failed: {e}")))?;
    mac_mk.update(&[0x02]);
    let mk: [u8; 32] = mac_mk.finalize().into_bytes().into();

    Ok((new_ck, mk))
}

/// Expand a one-time message key into (encryption key, authentication key,
/// IV) for the AEAD layer. IKM is the message key, salt is 32 zero bytes.
pub fn derive_message_keys(mk: &[u8; 32]) -> Result<([u8; 32], [u8; 32], [u8; 16]), RatchetError> {
    let zero_salt = [0u8; 32];
    let hk = Hkdf::<Sha256>::new(Some(&zero_salt), mk);
    let mut okm = [0u8; 80];
    hk.expand(MESSAGE_KDF_INFO, &mut okm)
        .map_err(|e| RatchetError::Crypto(format!("message key expansion failed: {e}")))?;

    let mut enc_key = [0u8; 32];
    let mut auth_key = [0u8; 32];
    let mut iv = [0u8; 16];
    enc_key.copy_from_slice(&okm[0..32]);
    auth_key.copy_from_slice(&okm[32..64]);
    iv.copy_from_slice(&okm[64..80]);
    Ok((enc_key, auth_key, iv))
}
