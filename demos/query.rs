use std::net::IpAddr;

use clap::Parser;
use p0f_client::{P0f, Status};
use tracing_subscriber::EnvFilter;

/// Ask a running p0f daemon about one address.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// p0f API socket, as passed to `p0f -s`
    #[arg(short, long, env = "P0F_SOCKET")]
    socket: String,

    /// IPv4 or IPv6 address to look up
    #[arg(long)]
    ip: IpAddr,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let p0f = P0f::new(&args.socket)?;
    let response = p0f.query(args.ip)?;

    match response.status {
        Status::NoMatch => println!("No match found"),
        _ => println!("Response: {response}"),
    }

    p0f.close()?;
    Ok(())
}
