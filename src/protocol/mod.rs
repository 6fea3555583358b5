//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the serial framing:
//! - 12-byte `CMD` header for host to device commands
//! - 8-byte `CMP`/`ERR`/`PKT` header for device to host frames
//! - Frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_command, command_header, Frame, WRITE_WITH_LENGTH_TAGS};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    literals, CommandHeader, FrameKind, Header, COMMAND_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    HEADER_SIZE,
};
