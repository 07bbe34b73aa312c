//! Shared plumbing for the `alice`/`bob` chat demo binaries.
//!
//! This crate is a harness, not part of the ratchet core: it exists to
//! exercise `dr_crypto` end to end over a real TCP socket, the way the
//! original reference implementation's `cmd/alice` + `cmd/bob` + `utils`
//! packages did. The pre-shared key and Bob's initial ratchet public key
//! are read from local files — "assume both parties have already agreed
//! the shared key before", unchanged from the original — because X3DH-style
//! key agreement is out of scope for the ratchet core this demo drives.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{info, warn};
use x25519_dalek::PublicKey;

use dr_crypto::{InMemorySkippedKeyStore, Message, RatchetState, SoftwareDhKeyPair};

pub type Session = RatchetState<SoftwareDhKeyPair, InMemorySkippedKeyStore>;

/// A session is mutated by both the read loop (`decrypt`) and the write
/// loop (`encrypt`) of the same connection. Per the core's single-threaded
/// access model, the whole state is guarded by one coarse mutex rather than
/// cloned or split — exactly the "single-owner actor or a coarse mutex"
/// embedding the core's design notes call for.
pub type SharedSession = Arc<Mutex<Session>>;

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `info`), the ambient-logging convention used across the
/// rest of this workspace's binaries.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Read the 32-byte pre-shared key from `path`.
pub fn read_shared_key(path: &Path) -> Result<[u8; 32]> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read shared key from {}", path.display()))?;
    if bytes.len() != 32 {
        bail!("unexpected key size: expected 32 bytes, got {}", bytes.len());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Write a DH public key to `path` so the peer can pick it up out of band.
pub fn share_public_key(path: &Path, key: &PublicKey) -> Result<()> {
    std::fs::write(path, key.as_bytes())
        .with_context(|| format!("failed to write public key to {}", path.display()))
}

/// Read a DH public key previously written by [`share_public_key`].
pub fn read_shared_public_key(path: &Path) -> Result<PublicKey> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read public key from {}", path.display()))?;
    if bytes.len() != 32 {
        bail!("unexpected key size: expected 32 bytes, got {}", bytes.len());
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(PublicKey::from(arr))
}

/// Newline-delimited JSON envelope for one ratchet `Message`. Mirrors the
/// original's `json.Marshal(Message)` — Go base64-encodes byte slices by
/// default, so the `data` field here is the base64 of `Message::to_wire()`.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    data: String,
}

fn encode_envelope(msg: &Message) -> String {
    let envelope = WireEnvelope {
        data: STANDARD.encode(msg.to_wire()),
    };
    serde_json::to_string(&envelope).expect("WireEnvelope always serializes")
}

fn decode_envelope(line: &str) -> Result<Message> {
    let envelope: WireEnvelope = serde_json::from_str(line).context("invalid JSON envelope")?;
    let bytes = STANDARD.decode(envelope.data).context("invalid base64 payload")?;
    Message::from_wire(&bytes).map_err(|e| anyhow::anyhow!("invalid message: {e}"))
}

/// Read incoming lines from `reader`, decrypt each with `session`, and print
/// the plaintext. Returns when the peer closes the connection.
pub async fn handle_incoming(mut reader: BufReader<OwnedReadHalf>, session: SharedSession) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("connection closed by peer");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "error reading from socket");
                return;
            }
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        let msg = match decode_envelope(trimmed) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "error parsing incoming message");
                continue;
            }
        };

        let result = session.lock().await.decrypt(&msg, b"");
        match result {
            Ok(plaintext) => {
                print!("\n{}", String::from_utf8_lossy(&plaintext));
                print!("You: ");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            Err(e) => warn!(error = %e, "error decrypting message"),
        }
    }
}

/// Read lines from stdin, encrypt each with `session` as `sender`, and write
/// the wire envelope to `writer`.
pub async fn send_loop(mut writer: OwnedWriteHalf, session: SharedSession, sender: &str) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    print!("You: ");
    std::io::Write::flush(&mut std::io::stdout())?;

    while let Some(text) = lines.next_line().await? {
        let plaintext = format!("{sender}: {text}\n");
        let msg = session
            .lock()
            .await
            .encrypt(plaintext.as_bytes(), b"")
            .map_err(|e| anyhow::anyhow!("error encrypting message: {e}"))?;

        let mut line = encode_envelope(&msg);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        print!("You: ");
        std::io::Write::flush(&mut std::io::stdout())?;
    }
    Ok(())
}
