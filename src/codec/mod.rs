//! Codec module - sub-framing inside USB payloads.
//!
//! - [`vlq`] - 7-bit variable-length integers
//! - [`Records`] - lazy decoder for batched application messages
//!
//! # Example
//!
//! ```
//! use sc64_link::codec::{encode_record, Records, RecordFormat};
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::new();
//! encode_record(&mut buf, 4, b"entity").unwrap();
//! encode_record(&mut buf, 1, b"").unwrap();
//!
//! let types: Vec<u32> = Records::new(buf.freeze(), RecordFormat::Vlq)
//!     .map(|r| r.unwrap().message_type)
//!     .collect();
//! assert_eq!(types, vec![4, 1]);
//! ```

mod records;
pub mod vlq;

pub use records::{encode_legacy_record, encode_record, Record, RecordFormat, Records};
