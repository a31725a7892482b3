// ABOUTME: Example application demonstrating the Direct handler relaying to a fixed upstream
// ABOUTME: Reads the bind address and upstream address from the first two CLI arguments

use std::env;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use trelay::{listen_and_serve, Direct, DirectConfig};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut args = env::args().skip(1);
    let bind_addr = args
        .next()
        .unwrap_or_else(|| "0.0.0.0:7778".to_string());
    let upstream_addr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:7777".to_string());

    let handler = Direct::new(DirectConfig::new(upstream_addr).with_max_players(100));

    tracing::info!(%bind_addr, "starting relay");
    listen_and_serve(bind_addr, handler).await
}
