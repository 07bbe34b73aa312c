use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dr_crypto::{DhKeyPair, RatchetState, SoftwareDhKeyPair};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

use dr_chat::{handle_incoming, init_logging, read_shared_key, send_loop, share_public_key};

/// Bob is the responder: he listens for Alice, publishes his initial
/// ratchet public key, and cannot send until he has received her first
/// message.
#[derive(Parser, Debug)]
#[command(author, version, about = "Double Ratchet chat demo — responder")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Path to the 32-byte pre-shared key.
    #[arg(long, default_value = "sk.bin")]
    shared_key: PathBuf,

    /// Path to write our initial ratchet public key for Alice to pick up.
    #[arg(long, default_value = "pub.bin")]
    pub_key_out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!(listen = %args.listen, "Bob is waiting for Alice to connect");
    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    let key_pair = SoftwareDhKeyPair::generate().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    share_public_key(&args.pub_key_out, &key_pair.public_key())?;

    let sk = read_shared_key(&args.shared_key)?;
    let session = RatchetState::init_bob(&sk, key_pair).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let session = Arc::new(Mutex::new(session));

    let (stream, peer) = listener.accept().await.context("failed to accept connection")?;
    info!(peer = %peer, "connected to Alice");

    let (read_half, write_half) = stream.into_split();
    let reader = BufReader::new(read_half);

    let recv_task = tokio::spawn(handle_incoming(reader, session.clone()));
    send_loop(write_half, session, "Bob").await?;
    recv_task.abort();
    Ok(())
}
