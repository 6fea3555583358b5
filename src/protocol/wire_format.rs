//! Wire format encoding and decoding.
//!
//! Host to device (command):
//! ```text
//! ┌─────────┬───────┬──────────┬──────────┬─────────────┐
//! │ "CMD"   │ Tag   │ Arg0     │ Arg1     │ Payload     │
//! │ 3 bytes │ 1 byte│ uint32 BE│ uint32 BE│ arg1 bytes  │
//! └─────────┴───────┴──────────┴──────────┴─────────────┘
//! ```
//!
//! Device to host (complete / error / packet):
//! ```text
//! ┌──────────────────┬───────┬──────────┬───────────────┐
//! │ "CMP"|"ERR"|"PKT"│ Tag   │ Length   │ Payload       │
//! │ 3 bytes          │ 1 byte│ uint32 BE│ length bytes  │
//! └──────────────────┴───────┴──────────┴───────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{LinkError, Result};

/// Inbound (device to host) header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Outbound (host to device) command header size in bytes.
pub const COMMAND_HEADER_SIZE: usize = 12;

/// Default maximum inbound payload size (64 MiB, a full SDRAM read).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Frame literals.
pub mod literals {
    /// Host to device command.
    pub const CMD: &[u8; 3] = b"CMD";
    /// Command completed successfully.
    pub const CMP: &[u8; 3] = b"CMP";
    /// Command failed.
    pub const ERR: &[u8; 3] = b"ERR";
    /// Unsolicited packet.
    pub const PKT: &[u8; 3] = b"PKT";
}

/// Frame kind, selected by the three-byte literal.
///
/// Tags live in a per-kind namespace: `'U'` as a command is a USB write,
/// `'U'` as a packet is inbound USB data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `CMD`, host to device.
    Command,
    /// `CMP`, successful reply.
    Complete,
    /// `ERR`, failed reply.
    Error,
    /// `PKT`, unsolicited event.
    Packet,
}

impl FrameKind {
    /// The literal that starts frames of this kind.
    pub fn literal(self) -> &'static [u8; 3] {
        match self {
            FrameKind::Command => literals::CMD,
            FrameKind::Complete => literals::CMP,
            FrameKind::Error => literals::ERR,
            FrameKind::Packet => literals::PKT,
        }
    }

    /// Map an inbound literal to its kind.
    ///
    /// Only `CMP`, `ERR` and `PKT` are valid on the device to host stream.
    pub fn from_inbound_literal(literal: &[u8]) -> Option<Self> {
        match literal {
            b"CMP" => Some(FrameKind::Complete),
            b"ERR" => Some(FrameKind::Error),
            b"PKT" => Some(FrameKind::Packet),
            _ => None,
        }
    }

    /// Check if this kind answers a pending command.
    #[inline]
    pub fn is_reply(self) -> bool {
        matches!(self, FrameKind::Complete | FrameKind::Error)
    }
}

/// Decoded inbound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (never `Command` on the inbound stream).
    pub kind: FrameKind,
    /// Single-character tag.
    pub tag: u8,
    /// Payload length in bytes.
    pub length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: FrameKind, tag: u8, length: u32) -> Self {
        Self { kind, tag, length }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use sc64_link::protocol::{FrameKind, Header};
    ///
    /// let header = Header::new(FrameKind::Complete, b'v', 4);
    /// assert_eq!(&header.encode(), b"CMPv\x00\x00\x00\x04");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..3].copy_from_slice(self.kind.literal());
        buf[3] = self.tag;
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Decode an inbound header.
    ///
    /// Returns `Ok(None)` if fewer than 8 bytes are available and
    /// `Err(Framing)` if the literal is not `CMP`, `ERR` or `PKT`.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let kind = FrameKind::from_inbound_literal(&buf[0..3]).ok_or(LinkError::Framing {
            literal: [buf[0], buf[1], buf[2]],
        })?;
        Ok(Some(Self {
            kind,
            tag: buf[3],
            length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }))
    }
}

/// Decoded outbound command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Command tag (e.g. `'v'`, `'V'`, `'U'`, `'M'`).
    pub tag: u8,
    /// First argument.
    pub arg0: u32,
    /// Second argument; payload length for write-with-length tags.
    pub arg1: u32,
}

impl CommandHeader {
    /// Create a new command header.
    pub fn new(tag: u8, arg0: u32, arg1: u32) -> Self {
        Self { tag, arg0, arg1 }
    }

    /// Encode the command header (Big Endian).
    pub fn encode(&self) -> [u8; COMMAND_HEADER_SIZE] {
        let mut buf = [0u8; COMMAND_HEADER_SIZE];
        buf[0..3].copy_from_slice(literals::CMD);
        buf[3] = self.tag;
        buf[4..8].copy_from_slice(&self.arg0.to_be_bytes());
        buf[8..12].copy_from_slice(&self.arg1.to_be_bytes());
        buf
    }

    /// Decode a command header.
    ///
    /// Used on the device side of the link (simulators, tests).
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < COMMAND_HEADER_SIZE {
            return Ok(None);
        }
        if &buf[0..3] != literals::CMD {
            return Err(LinkError::Framing {
                literal: [buf[0], buf[1], buf[2]],
            });
        }
        Ok(Some(Self {
            tag: buf[3],
            arg0: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            arg1: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }))
    }
}
