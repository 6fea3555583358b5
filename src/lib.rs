//! # sc64-link
//!
//! Host-side serial link to a SummerCart64 N64 flashcart.
//!
//! The cart speaks a framed command/response protocol over USB serial:
//!
//! - **Commands** (`CMD`) go host to device and are answered with `CMP` or `ERR`
//! - **Packets** (`PKT`) arrive unsolicited: button presses, debug text, USB data
//! - **USB data** from the running game carries batched application messages,
//!   each framed as `vlq(type) . vlq(length) . data`
//!
//! Framing is recovered with a DTR/DSR handshake whenever the stream
//! desynchronizes or a command goes unanswered.
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sc64_link::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .on_input(|input| println!("{:?}", input))
//!         .connect("/dev/ttyUSB0")
//!         .await?;
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!
//!     let mux = client.multiplexer();
//!     mux.queue_reset()?;
//!     mux.queue_ready()?;
//!     mux.run(Duration::from_secs(1) / 60, shutdown, |mux, frame| {
//!         let _ = mux.queue_bg_color(if frame % 60 < 30 { 0x000000FF } else { 0x202020FF });
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod mux;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod session;

pub use client::{Client, ClientBuilder};
pub use command::{Command, Reply, Version};
pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use mux::{ControllerInput, Multiplexer};
pub use session::SessionState;
