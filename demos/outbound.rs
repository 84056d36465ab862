use std::{
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use clap::Parser;
use p0f_client::P0f;
use tracing_subscriber::EnvFilter;

/// Open a TCP connection to a remote host and fingerprint it.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    // This default ip is for tcpbin.com
    #[arg(short, long, default_value = "45.79.112.203:4242")]
    address: SocketAddr,

    #[arg(short, long, env = "P0F_SOCKET")]
    socket: String,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let p0f = P0f::new(&args.socket)?;
    let _stream = TcpStream::connect(args.address)?;

    thread::sleep(Duration::from_secs(1));
    let response = p0f.query(args.address.ip())?;
    match (response.is_match(), response.hops()) {
        (true, Some(hops)) => println!("{response}, {hops} hops away"),
        (true, None) => println!("{response}"),
        (false, _) => println!("no match for {}", args.address.ip()),
    }
    println!("{response:#?}");

    Ok(())
}
