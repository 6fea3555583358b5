//! Version probe - connect to a cart and print its firmware version.
//!
//! This example demonstrates:
//! - Opening a real serial port with the `serial` feature
//! - Logging device printf output through `tracing`
//! - Issuing typed commands
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=sc64_link=debug,sc64::printf=info \
//!     cargo run --features serial --example version -- /dev/ttyUSB0
//! ```

use sc64_link::handler::ButtonPacket;
use sc64_link::Client;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::args()
        .nth(1)
        .ok_or("usage: version <serial port>")?;

    let client = Client::builder()
        .on(|_: ButtonPacket| tracing::info!("cart button pressed"))
        .connect(&port)
        .await?;

    println!("{}", client.version().await?);
    Ok(())
}
