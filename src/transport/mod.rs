//! Transport module - the serial collaborator.
//!
//! The link consumes a byte stream plus two modem control lines:
//! - [`ControlLines`] - DTR output and DSR input, used by [`handshake`]
//! - [`split_port`] - shares one port between the read loop, the writer
//!   task and the handshake
//! - `serial` - `tokio-serial` backend (feature `serial`)

mod lines;
mod split;

#[cfg(feature = "serial")]
pub mod serial;

pub use lines::{handshake, ControlLines};
pub use split::{split_port, PortLines, PortReader, PortWriter};
