//! Typed unsolicited packets.
//!
//! Each `PKT` tag carries its own fixed sub-header:
//!
//! | Tag | Type | Layout |
//! |-----|------|--------|
//! | `X` | [`AuxPacket`] | value u32 |
//! | `B` | [`ButtonPacket`] | empty |
//! | `U` | [`UsbPacket`] | type u8, length u24, data |
//! | `G` | [`UsbFlushedPacket`] | empty |
//! | `D` | [`DiskRequestPacket`] | command u32, address u32, geometry u32, data |
//! | `I` | [`PrintfPacket`] | UTF-8 text |
//! | `S` | [`SaveWritebackPacket`] | save type u32, data |
//! | `F` | [`UpdateStatusPacket`] | progress u32 |

use bytes::{Buf, Bytes};

use crate::error::{LinkError, Result};

/// Packet tags.
pub mod tags {
    /// Aux register changed.
    pub const AUX: u8 = b'X';
    /// Cart button pressed.
    pub const BUTTON: u8 = b'B';
    /// USB data from the N64.
    pub const USB: u8 = b'U';
    /// N64 consumed the last USB write.
    pub const USB_FLUSHED: u8 = b'G';
    /// 64DD disk request.
    pub const DISK_REQUEST: u8 = b'D';
    /// Debug text.
    pub const PRINTF: u8 = b'I';
    /// Save memory writeback.
    pub const SAVE_WRITEBACK: u8 = b'S';
    /// Firmware update progress.
    pub const UPDATE_STATUS: u8 = b'F';
}

/// A packet type that can be decoded from a `PKT` payload.
pub trait DecodePacket: Sized + Send + 'static {
    /// Tag this packet arrives under.
    const TAG: u8;

    /// Decode the payload.
    fn decode(payload: Bytes) -> Result<Self>;
}

fn malformed(tag: u8, reason: impl Into<String>) -> LinkError {
    LinkError::MalformedPacket {
        tag,
        reason: reason.into(),
    }
}

fn ensure_len(tag: u8, payload: &Bytes, needed: usize) -> Result<()> {
    if payload.len() < needed {
        return Err(malformed(
            tag,
            format!("{} bytes, need at least {}", payload.len(), needed),
        ));
    }
    Ok(())
}

/// Aux register value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxPacket {
    /// New aux register value.
    pub value: u32,
}

impl DecodePacket for AuxPacket {
    const TAG: u8 = tags::AUX;

    fn decode(mut payload: Bytes) -> Result<Self> {
        ensure_len(Self::TAG, &payload, 4)?;
        Ok(Self {
            value: payload.get_u32(),
        })
    }
}

/// The cart button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPacket;

impl DecodePacket for ButtonPacket {
    const TAG: u8 = tags::BUTTON;

    fn decode(_payload: Bytes) -> Result<Self> {
        Ok(Self)
    }
}

/// USB data written by the N64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPacket {
    /// Application sub-protocol discriminant.
    pub packet_type: u8,
    /// Packet body, exactly as long as the header announced.
    pub data: Bytes,
}

impl DecodePacket for UsbPacket {
    const TAG: u8 = tags::USB;

    fn decode(mut payload: Bytes) -> Result<Self> {
        ensure_len(Self::TAG, &payload, 4)?;
        let packet_type = payload.get_u8();
        let length = payload.get_uint(3) as usize;
        if length != payload.len() {
            return Err(malformed(
                Self::TAG,
                format!("length field {} but {} bytes follow", length, payload.len()),
            ));
        }
        Ok(Self {
            packet_type,
            data: payload,
        })
    }
}

/// The N64 finished reading the last USB write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbFlushedPacket;

impl DecodePacket for UsbFlushedPacket {
    const TAG: u8 = tags::USB_FLUSHED;

    fn decode(_payload: Bytes) -> Result<Self> {
        Ok(Self)
    }
}

/// 64DD disk access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRequestPacket {
    /// Disk command (read or write).
    pub command: u32,
    /// Target address in N64 memory.
    pub address: u32,
    /// Packed track, head and block.
    pub geometry: u32,
    /// Block data for writes.
    pub data: Bytes,
}

impl DecodePacket for DiskRequestPacket {
    const TAG: u8 = tags::DISK_REQUEST;

    fn decode(mut payload: Bytes) -> Result<Self> {
        ensure_len(Self::TAG, &payload, 12)?;
        let command = payload.get_u32();
        let address = payload.get_u32();
        let geometry = payload.get_u32();
        Ok(Self {
            command,
            address,
            geometry,
            data: payload,
        })
    }
}

/// Debug text printed by the N64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintfPacket {
    /// Text as printed, invalid UTF-8 replaced.
    pub text: String,
}

impl DecodePacket for PrintfPacket {
    const TAG: u8 = tags::PRINTF;

    fn decode(payload: Bytes) -> Result<Self> {
        Ok(Self {
            text: String::from_utf8_lossy(&payload).into_owned(),
        })
    }
}

/// Save memory flushed by the N64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveWritebackPacket {
    /// Save memory kind (EEPROM, SRAM, flash).
    pub save_type: u32,
    /// Save contents.
    pub data: Bytes,
}

impl DecodePacket for SaveWritebackPacket {
    const TAG: u8 = tags::SAVE_WRITEBACK;

    fn decode(mut payload: Bytes) -> Result<Self> {
        ensure_len(Self::TAG, &payload, 4)?;
        let save_type = payload.get_u32();
        Ok(Self {
            save_type,
            data: payload,
        })
    }
}

/// Firmware update progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStatusPacket {
    /// Progress reported by the firmware.
    pub progress: u32,
}

impl DecodePacket for UpdateStatusPacket {
    const TAG: u8 = tags::UPDATE_STATUS;

    fn decode(mut payload: Bytes) -> Result<Self> {
        ensure_len(Self::TAG, &payload, 4)?;
        Ok(Self {
            progress: payload.get_u32(),
        })
    }
}
