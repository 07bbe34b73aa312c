//! dr_crypto — Double Ratchet core.
//!
//! Forward-secret, post-compromise-secure, out-of-order-tolerant symmetric
//! messaging between two parties who already share an initial secret and an
//! initial DH public key (the handshake that produces those — X3DH or
//! equivalent — is out of scope; see the module-level docs in `ratchet`).
//!
//! # Module layout
//! - `dh`       — X25519 keypairs and the `DhKeyPair` capability trait
//! - `kdf`      — root-key KDF, chain-key KDF, message-key expansion
//! - `aead`     — AES-256-CTR + HMAC-SHA256 encrypt-then-MAC
//! - `message`  — `Header`/`Message` wire codec
//! - `store`    — the skipped-message-key store
//! - `ratchet`  — the state machine tying all of the above together
//! - `error`    — unified error type

pub mod aead;
pub mod dh;
pub mod error;
pub mod kdf;
pub mod message;
pub mod ratchet;
pub mod store;

pub use dh::{DhKeyPair, SoftwareDhKeyPair};
pub use error::RatchetError;
pub use message::{Header, Message};
pub use ratchet::{RatchetState, DEFAULT_MAX_SKIP};
pub use store::{InMemorySkippedKeyStore, SkippedKeyStore};
