//! Host to device commands and their replies.
//!
//! # Example
//!
//! ```
//! use sc64_link::command::{tags, Command};
//!
//! let cmd = Command::new(tags::MEMORY_READ).arg0(0x1000_0000).arg1(64);
//! assert_eq!(cmd.tag, b'm');
//! assert!(!cmd.is_fire_and_forget());
//! ```

use std::fmt;

use bytes::Bytes;

use crate::error::{LinkError, Result};
use crate::writer::OutboundFrame;

/// Known command tags.
pub mod tags {
    /// Read the identifier string (`"SC64"`).
    pub const IDENTIFIER_GET: u8 = b'v';
    /// Read the firmware version.
    pub const VERSION_GET: u8 = b'V';
    /// Send a USB packet to the N64 (arg0 = USB packet type).
    pub const USB_WRITE: u8 = b'U';
    /// Write to cart memory (arg0 = address).
    pub const MEMORY_WRITE: u8 = b'M';
    /// Read from cart memory (arg0 = address, arg1 = length).
    pub const MEMORY_READ: u8 = b'm';
}

/// Tags the device never replies to.
pub const FIRE_AND_FORGET_TAGS: &[u8] = &[tags::USB_WRITE];

/// A command to send to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command tag.
    pub tag: u8,
    /// First argument.
    pub arg0: u32,
    /// Second argument. Ignored for write-with-length tags.
    pub arg1: u32,
    /// Payload.
    pub data: Bytes,
}

impl Command {
    /// Create a command with zero arguments and no payload.
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            arg0: 0,
            arg1: 0,
            data: Bytes::new(),
        }
    }

    /// Set `arg0`.
    pub fn arg0(mut self, arg0: u32) -> Self {
        self.arg0 = arg0;
        self
    }

    /// Set `arg1`.
    pub fn arg1(mut self, arg1: u32) -> Self {
        self.arg1 = arg1;
        self
    }

    /// Set the payload.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Whether the device answers this command.
    pub fn is_fire_and_forget(&self) -> bool {
        FIRE_AND_FORGET_TAGS.contains(&self.tag)
    }

    pub(crate) fn into_frame(self) -> OutboundFrame {
        OutboundFrame::command(self.tag, self.arg0, self.arg1, self.data)
    }
}

/// Outcome of a command.
///
/// Timeouts and abandoned requests are not errors: they come back as a
/// reply with `success == false` and no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// `true` for `CMP`, `false` for `ERR`, timeout or abandonment.
    pub success: bool,
    /// Reply payload.
    pub data: Bytes,
}

impl Reply {
    /// A successful reply.
    pub fn complete(data: Bytes) -> Self {
        Self {
            success: true,
            data,
        }
    }

    /// A failed reply carrying the device's error payload.
    pub fn error(data: Bytes) -> Self {
        Self {
            success: false,
            data,
        }
    }

    /// A failed reply with no data.
    pub fn failed() -> Self {
        Self::error(Bytes::new())
    }

    /// Turn a failed reply into [`LinkError::CommandFailed`].
    pub fn into_result(self, tag: u8) -> Result<Bytes> {
        if self.success {
            Ok(self.data)
        } else {
            Err(LinkError::CommandFailed { tag })
        }
    }
}

/// Firmware version as reported by `'V'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Identifier string from `'v'`.
    pub identifier: String,
    /// Major firmware version.
    pub major: u16,
    /// Minor firmware version.
    pub minor: u16,
    /// Firmware revision.
    pub revision: u32,
}

impl Version {
    /// Decode a `'V'` reply payload.
    pub fn decode(identifier: String, data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(LinkError::Protocol(format!(
                "version reply is {} bytes, expected 8",
                data.len()
            )));
        }
        Ok(Self {
            identifier,
            major: u16::from_be_bytes([data[0], data[1]]),
            minor: u16::from_be_bytes([data[2], data[3]]),
            revision: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}.{}",
            self.identifier, self.major, self.minor, self.revision
        )
    }
}
