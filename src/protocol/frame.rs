//! Frame struct and frame builders.
//!
//! A [`Frame`] is one complete inbound unit: kind, tag and payload. The
//! length field of the wire header is implied by `payload.len()`.
//!
//! # Example
//!
//! ```
//! use sc64_link::protocol::{Frame, FrameKind};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(FrameKind::Complete, b'v', Bytes::from_static(b"SC64"));
//! assert_eq!(frame.tag_char(), 'v');
//! assert_eq!(frame.encode(), b"CMPv\x00\x00\x00\x04SC64");
//! ```

use bytes::Bytes;

use super::wire_format::{
    CommandHeader, FrameKind, Header, COMMAND_HEADER_SIZE, HEADER_SIZE,
};

/// Command tags whose `arg1` is always the payload length.
pub const WRITE_WITH_LENGTH_TAGS: &[u8] = b"MU";

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Single-character tag.
    pub tag: u8,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: FrameKind, tag: u8, payload: Bytes) -> Self {
        Self { kind, tag, payload }
    }

    /// The wire header for this frame.
    pub fn header(&self) -> Header {
        Header::new(self.kind, self.tag, self.payload.len() as u32)
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Tag as a character, for logging.
    #[inline]
    pub fn tag_char(&self) -> char {
        char::from(self.tag)
    }

    /// Check if this frame answers a pending command.
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.kind.is_reply()
    }

    /// Encode as device to host bytes (`CMP`/`ERR`/`PKT` header + payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header().encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Build the header of a host to device command.
///
/// For write-with-length tags (`'M'`, `'U'`) `arg1` is replaced by the
/// payload length regardless of what the caller passed.
pub fn command_header(tag: u8, arg0: u32, arg1: u32, payload: &[u8]) -> CommandHeader {
    let arg1 = if WRITE_WITH_LENGTH_TAGS.contains(&tag) {
        payload.len() as u32
    } else {
        arg1
    };
    CommandHeader::new(tag, arg0, arg1)
}

/// Build a complete command frame as a single byte vector.
///
/// # Example
///
/// ```
/// use sc64_link::protocol::build_command;
///
/// let bytes = build_command(b'U', 0xFF, 0, b"hi");
/// assert_eq!(&bytes[..4], b"CMDU");
/// assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
/// ```
pub fn build_command(tag: u8, arg0: u32, arg1: u32, payload: &[u8]) -> Vec<u8> {
    let header = command_header(tag, arg0, arg1, payload);
    let mut buf = Vec::with_capacity(COMMAND_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(FrameKind::Packet, b'I', Bytes::from_static(b"hello"));

        assert_eq!(frame.tag_char(), 'I');
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.header().length, 5);
        assert!(!frame.is_reply());
    }

    #[test]
    fn test_error_frame_is_reply() {
        let frame = Frame::new(FrameKind::Error, b'm', Bytes::from_static(b"test"));

        assert_eq!(frame.header(), Header::new(FrameKind::Error, b'm', 4));
        assert!(frame.is_reply());
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = Frame::new(FrameKind::Packet, b'B', Bytes::new());
        assert_eq!(frame.encode(), b"PKTB\x00\x00\x00\x00");
    }

    #[test]
    fn test_write_with_length_overrides_arg1() {
        let header = command_header(b'M', 0x1000_0000, 999, b"abcd");
        assert_eq!(header.arg0, 0x1000_0000);
        assert_eq!(header.arg1, 4);

        let header = command_header(b'U', 0xFF, 0, &[0u8; 300]);
        assert_eq!(header.arg1, 300);
    }

    #[test]
    fn test_other_tags_keep_arg1() {
        let header = command_header(b'm', 0x1000_0000, 512, b"");
        assert_eq!(header.arg1, 512);
    }

    #[test]
    fn test_build_command() {
        let bytes = build_command(b'v', 0, 0, b"");
        assert_eq!(bytes, b"CMDv\x00\x00\x00\x00\x00\x00\x00\x00");

        let bytes = build_command(b'M', 0x0102_0304, 0, b"xy");
        assert_eq!(bytes.len(), COMMAND_HEADER_SIZE + 2);
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
        assert_eq!(&bytes[12..], b"xy");
    }
}
