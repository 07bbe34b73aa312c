use thiserror::Error;

/// Error kinds produced by the ratchet core, mirroring the error taxonomy in
/// the protocol design: init-time failures, primitive failures, malformed or
/// out-of-policy messages, authentication failures, and key-store failures.
#[derive(Debug, Error)]
pub enum RatchetError {
    #[error("init error: {0}")]
    Init(String),

    #[error("crypto primitive error: {0}")]
    Crypto(String),

    #[error("message error: {0}")]
    Message(String),

    #[error("authentication failed (MAC mismatch — possible tampering)")]
    Auth,

    #[error("skipped-key store error: {0}")]
    Storage(String),
}
