use std::{net::TcpListener, thread, time::Duration};

use clap::Parser;
use p0f_client::P0f;
use tracing_subscriber::EnvFilter;

/// Accept one TCP connection and fingerprint the peer.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:6666")]
    address: String,

    #[arg(short, long, env = "P0F_SOCKET")]
    socket: String,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let p0f = P0f::new(&args.socket)?;
    let listener = TcpListener::bind(&args.address)?;

    println!("waiting for connection on {}", args.address);
    let (_stream, peer) = listener.accept()?;
    println!("connection from {peer}");

    // give p0f a moment to see the handshake
    thread::sleep(Duration::from_secs(1));
    let response = p0f.query(peer.ip())?;
    if response.is_match() {
        println!("{response}");
    }
    println!("{response:#?}");

    Ok(())
}
