//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 8 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! A header whose literal is not `CMP`, `ERR` or `PKT` yields
//! [`LinkError::Framing`]. The buffer is then desynchronized; the owner
//! must [`clear`](FrameBuffer::clear) it and resync the link.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{LinkError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 8 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from serial reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Frames are returned in wire order. Partial data stays buffered for
    /// the next push.
    ///
    /// # Errors
    ///
    /// `Framing` on an unrecognized literal, `PayloadTooLarge` if a header
    /// announces more than the configured maximum. Frames completed before
    /// the fault are lost with it; call `push_into` to keep them.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        self.push_into(data, &mut frames)?;
        Ok(frames)
    }

    /// Like [`push`](Self::push), but appends to `frames` so frames that
    /// precede a framing fault are still delivered.
    pub fn push_into(&mut self, data: &[u8], frames: &mut Vec<Frame>) -> Result<()> {
        self.buffer.extend_from_slice(data);

        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(())
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let header = match Header::decode(&self.buffer)? {
                    Some(header) => header,
                    None => return Ok(None),
                };

                if header.length > self.max_payload_size {
                    return Err(LinkError::PayloadTooLarge {
                        size: header.length,
                        max: self.max_payload_size,
                    });
                }

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.length == 0 {
                    return Ok(Some(Frame::new(header.kind, header.tag, Bytes::new())));
                }

                self.state = State::WaitingForPayload { header };
                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let remaining = header.length as usize;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;

                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header.kind, header.tag, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
