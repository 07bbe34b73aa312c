use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dr_crypto::RatchetState;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::info;

use dr_chat::{handle_incoming, init_logging, read_shared_key, read_shared_public_key, send_loop};

/// Alice is the initiator: she already knows Bob's initial ratchet public
/// key (published out of band) and connects to him first.
#[derive(Parser, Debug)]
#[command(author, version, about = "Double Ratchet chat demo — initiator")]
struct Args {
    /// Address to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    connect: String,

    /// Path to the 32-byte pre-shared key.
    #[arg(long, default_value = "sk.bin")]
    shared_key: PathBuf,

    /// Path to Bob's published initial ratchet public key.
    #[arg(long, default_value = "pub.bin")]
    bob_public_key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let sk = read_shared_key(&args.shared_key)?;
    let bob_public = read_shared_public_key(&args.bob_public_key)?;
    let session =
        RatchetState::init_alice(&sk, &bob_public).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let session = Arc::new(Mutex::new(session));

    info!(connect = %args.connect, "Alice is connecting to Bob");
    let stream = TcpStream::connect(&args.connect)
        .await
        .with_context(|| format!("failed to connect to {}", args.connect))?;

    let (read_half, write_half) = stream.into_split();
    let reader = BufReader::new(read_half);

    let recv_task = tokio::spawn(handle_incoming(reader, session.clone()));
    send_loop(write_half, session, "Alice").await?;
    recv_task.abort();
    Ok(())
}
