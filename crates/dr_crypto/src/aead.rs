//! Per-message encrypt-then-MAC, built from AES-256-CTR and HMAC-SHA256
//! rather than a combined AEAD construction.
//!
//! Wire format: `IV (16) ∥ AES-256-CTR ciphertext ∥ HMAC-SHA256 tag (32)`.
//! The MAC covers the caller-supplied associated data followed by
//! everything written so far (IV ∥ ciphertext).

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::RatchetError;
use crate::kdf::derive_message_keys;

type Aes256Ctr = ctr::Ctr64BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const TAG_LEN: usize = 32;
const IV_LEN: usize = 16;

fn auth_tag(auth_key: &[u8; 32], ad: &[u8], data_so_far: &[u8]) -> Result<[u8; 32], RatchetError> {
    let mut mac = HmacSha256::new_from_slice(auth_key)
        .map_err(|e| RatchetError::Crypto(format!("HMAC keying failed: {e}")))?;
    mac.update(ad);
    mac.update(data_so_far);
    Ok(mac.finalize().into_bytes().into())
}

/// Encrypt `plaintext` under one-time message key `mk`. `ad` is associated
/// data that is authenticated but not encrypted (the caller is expected to
/// append the encoded message header to their own AD before calling this).
pub fn encrypt(mk: &[u8; 32], plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>, RatchetError> {
    let (enc_key, auth_key, iv) = derive_message_keys(mk)?;

    let mut out = Vec::with_capacity(IV_LEN + plaintext.len() + TAG_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);

    let mut cipher = Aes256Ctr::new(&enc_key.into(), &iv.into());
    cipher.apply_keystream(&mut out[IV_LEN..]);

    let tag = auth_tag(&auth_key, ad, &out)?;
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypt and verify wire-format bytes (`iv ∥ ciphertext ∥ tag`) under
/// message key `mk`. Tag comparison is constant-time (via `Mac::verify_slice`).
/// On authentication failure the caller must not mutate any ratchet state —
/// this function has no side effects on failure.
pub fn decrypt(mk: &[u8; 32], data: &[u8], ad: &[u8]) -> Result<Vec<u8>, RatchetError> {
    if data.len() < IV_LEN + TAG_LEN {
        return Err(RatchetError::Message(format!(
            "ciphertext too short: {} bytes",
            data.len()
        )));
    }

    let (body, tag) = data.split_at(data.len() - TAG_LEN);
    let (enc_key, auth_key, _iv_unused) = derive_message_keys(mk)?;

    let mut mac = HmacSha256::new_from_slice(&auth_key)
        .map_err(|e| RatchetError::Crypto(format!("HMAC keying failed: {e}")))?;
    mac.update(ad);
    mac.update(body);
    mac.verify_slice(tag).map_err(|_| RatchetError::Auth)?;

    let iv = &body[..IV_LEN];
    let ciphertext = &body[IV_LEN..];
    let mut plaintext = ciphertext.to_vec();
    let mut cipher = Aes256Ctr::new(&enc_key.into(), iv.into());
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}
