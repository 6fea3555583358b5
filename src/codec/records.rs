//! Sub-message records packed inside a USB payload.
//!
//! Current firmware:
//! ```text
//! ┌───────────┬─────────────┬──────────────┐
//! │ vlq(type) │ vlq(length) │ data         │  repeated
//! └───────────┴─────────────┴──────────────┘
//! ```
//!
//! Legacy firmware:
//! ```text
//! ┌───────────┬───────────┬──────────────┐
//! │ length    │ type      │ data         │  repeated
//! │ uint16 BE │ uint16 BE │              │
//! └───────────┴───────────┴──────────────┘
//! ```
//!
//! Decoding is lazy: [`Records`] yields one record at a time and stops for
//! good after the first malformed one, since nothing after it can be
//! trusted.

use bytes::{BufMut, Bytes};
use serde::Deserialize;

use super::vlq;
use crate::error::{LinkError, Result};

/// Sub-message framing used inside batched USB payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `vlq(type) . vlq(length) . data`.
    #[default]
    Vlq,
    /// `length (u16 BE) . type (u16 BE) . data`.
    Legacy,
}

/// One application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Application message type.
    pub message_type: u32,
    /// Message body.
    pub data: Bytes,
}

impl Record {
    /// Create a new record.
    pub fn new(message_type: u32, data: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            data: data.into(),
        }
    }
}

/// Append one VLQ record to `buf`.
pub fn encode_record<B: BufMut>(buf: &mut B, message_type: u32, data: &[u8]) -> Result<()> {
    let mut header = [0u8; 2 * vlq::MAX_VLQ_LEN];
    let mut cursor = &mut header[..];
    let type_len = vlq::encode_into(u64::from(message_type), &mut cursor)?;
    let len_len = vlq::encode_into(data.len() as u64, &mut cursor)?;

    buf.put_slice(&header[..type_len + len_len]);
    buf.put_slice(data);
    Ok(())
}

/// Append one legacy fixed-header record to `buf`.
pub fn encode_legacy_record<B: BufMut>(buf: &mut B, message_type: u16, data: &[u8]) -> Result<()> {
    let length = u16::try_from(data.len()).map_err(|_| {
        LinkError::Protocol(format!(
            "legacy record body of {} bytes exceeds 65535",
            data.len()
        ))
    })?;
    buf.put_u16(length);
    buf.put_u16(message_type);
    buf.put_slice(data);
    Ok(())
}

/// Lazy decoder over a batched payload.
///
/// # Example
///
/// ```
/// use sc64_link::codec::{Records, RecordFormat};
/// use bytes::Bytes;
///
/// let payload = Bytes::from_static(&[0x01, 0x01, b'a', 0x03, 0x00]);
/// let records: Vec<_> = Records::new(payload, RecordFormat::Vlq)
///     .collect::<Result<_, _>>()
///     .unwrap();
///
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].message_type, 1);
/// assert_eq!(&records[0].data[..], b"a");
/// ```
#[derive(Debug, Clone)]
pub struct Records {
    remaining: Bytes,
    format: RecordFormat,
    failed: bool,
}

impl Records {
    /// Start decoding `payload`.
    pub fn new(payload: Bytes, format: RecordFormat) -> Self {
        Self {
            remaining: payload,
            format,
            failed: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    fn next_vlq(&mut self) -> Result<Record> {
        let (message_type, type_len) = vlq::decode_u32(&self.remaining)?;
        let (length, len_len) = vlq::decode_u32(&self.remaining[type_len..])?;
        self.take_body(type_len + len_len, message_type, length as usize)
    }

    fn next_legacy(&mut self) -> Result<Record> {
        if self.remaining.len() < 4 {
            return Err(LinkError::TruncatedInput);
        }
        let head = &self.remaining[..4];
        let length = u16::from_be_bytes([head[0], head[1]]) as usize;
        let message_type = u32::from(u16::from_be_bytes([head[2], head[3]]));
        self.take_body(4, message_type, length)
    }

    fn take_body(&mut self, header_len: usize, message_type: u32, length: usize) -> Result<Record> {
        if self.remaining.len() - header_len < length {
            return Err(LinkError::TruncatedInput);
        }
        let _ = self.remaining.split_to(header_len);
        let data = self.remaining.split_to(length);
        Ok(Record { message_type, data })
    }
}

impl Iterator for Records {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining.is_empty() {
            return None;
        }

        let record = match self.format {
            RecordFormat::Vlq => self.next_vlq(),
            RecordFormat::Legacy => self.next_legacy(),
        };

        if record.is_err() {
            self.failed = true;
            self.remaining.clear();
        }
        Some(record)
    }
}

impl std::iter::FusedIterator for Records {}
