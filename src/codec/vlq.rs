//! Variable-length quantity integers.
//!
//! Seven bits per byte, most significant group first. Every byte except
//! the last has its top bit set:
//!
//! ```text
//! 0x00000000  →  00
//! 0x0000007F  →  7F
//! 0x00000080  →  81 00
//! 0x00003FFF  →  FF 7F
//! 0x00004000  →  81 80 00
//! ```
//!
//! At most five bytes are used, so the largest encodable value is
//! `2^35 - 1`.

use bytes::BufMut;

use crate::error::{LinkError, Result};

/// Maximum encoded width in bytes.
pub const MAX_VLQ_LEN: usize = 5;

/// Largest value that fits in [`MAX_VLQ_LEN`] bytes.
pub const MAX_VLQ_VALUE: u64 = (1 << (7 * MAX_VLQ_LEN)) - 1;

/// Encode a value.
///
/// # Errors
///
/// `VlqOverflow` if the value needs more than five bytes.
///
/// # Example
///
/// ```
/// use sc64_link::codec::vlq;
///
/// assert_eq!(vlq::encode(0x80).unwrap(), vec![0x81, 0x00]);
/// ```
pub fn encode(value: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(MAX_VLQ_LEN);
    encode_into(value, &mut buf)?;
    Ok(buf)
}

/// Encode a value and append it to `buf`. Returns the number of bytes written.
pub fn encode_into<B: BufMut>(value: u64, buf: &mut B) -> Result<usize> {
    if value > MAX_VLQ_VALUE {
        return Err(LinkError::VlqOverflow);
    }

    let len = encoded_len(value);
    for i in (0..len).rev() {
        let group = ((value >> (7 * i)) & 0x7F) as u8;
        let continuation = if i == 0 { 0 } else { 0x80 };
        buf.put_u8(group | continuation);
    }
    Ok(len)
}

/// Number of bytes `value` encodes to (ignoring the five-byte limit).
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode a value from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// - `VlqOverflow` if five bytes are consumed without a terminal byte.
/// - `TruncatedInput` if the buffer ends before a terminal byte.
///
/// # Example
///
/// ```
/// use sc64_link::codec::vlq;
///
/// assert_eq!(vlq::decode(&[0x81, 0x80, 0x00, 0xAA]).unwrap(), (0x4000, 3));
/// ```
pub fn decode(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if i + 1 >= MAX_VLQ_LEN {
            return Err(LinkError::VlqOverflow);
        }
    }

    Err(LinkError::TruncatedInput)
}

/// Decode a value that must fit in 32 bits.
pub fn decode_u32(buf: &[u8]) -> Result<(u32, usize)> {
    let (value, len) = decode(buf)?;
    let value = u32::try_from(value).map_err(|_| LinkError::VlqOverflow)?;
    Ok((value, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(0).unwrap(), vec![0x00]);
        assert_eq!(encode(0x7F).unwrap(), vec![0x7F]);
        assert_eq!(encode(0x80).unwrap(), vec![0x81, 0x00]);
        assert_eq!(encode(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(encode(0x4000).unwrap(), vec![0x81, 0x80, 0x00]);
        assert_eq!(encode(255).unwrap(), vec![0x81, 0x7F]);
    }

    #[test]
    fn test_u32_max_fits_in_five_bytes() {
        let bytes = encode(u64::from(u32::MAX)).unwrap();
        assert_eq!(bytes, vec![0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_max_value() {
        let bytes = encode(MAX_VLQ_VALUE).unwrap();
        assert_eq!(bytes.len(), MAX_VLQ_LEN);
        assert_eq!(decode(&bytes).unwrap(), (MAX_VLQ_VALUE, MAX_VLQ_LEN));
    }

    #[test]
    fn test_encode_overflow() {
        assert!(matches!(encode(1 << 35), Err(LinkError::VlqOverflow)));
        assert!(matches!(encode(u64::MAX), Err(LinkError::VlqOverflow)));
    }

    #[test]
    fn test_decode_overflow() {
        let bytes = [0x80u8; 6];
        assert!(matches!(decode(&bytes), Err(LinkError::VlqOverflow)));

        let bytes = [0x81, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert!(matches!(decode(&bytes), Err(LinkError::VlqOverflow)));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode(&[]), Err(LinkError::TruncatedInput)));
        assert!(matches!(decode(&[0x81, 0x80]), Err(LinkError::TruncatedInput)));
    }

    #[test]
    fn test_decode_stops_at_terminal_byte() {
        let (value, len) = decode(&[0x05, 0xFF, 0xFF]).unwrap();
        assert_eq!(value, 5);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_u32_rejects_wide_values() {
        let bytes = encode(1 << 33).unwrap();
        assert!(matches!(decode_u32(&bytes), Err(LinkError::VlqOverflow)));
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = vec![0xAA];
        let written = encode_into(300, &mut buf).unwrap();
        assert_eq!(written, 2);
        assert_eq!(buf, vec![0xAA, 0x82, 0x2C]);
    }

    proptest! {
        #[test]
        fn prop_u32_roundtrip(value in any::<u32>()) {
            let bytes = encode(u64::from(value)).unwrap();
            let (decoded, consumed) = decode_u32(&bytes).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, bytes.len());
            prop_assert_eq!(consumed, encoded_len(u64::from(value)));
        }
    }
}
