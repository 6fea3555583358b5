//! Handler module - unsolicited packet dispatch.
//!
//! Provides:
//! - [`DecodePacket`] and the typed packets it decodes
//! - [`PacketRegistry`] - maps packet tags to handlers

mod packet;
mod registry;

pub use packet::{
    tags, AuxPacket, ButtonPacket, DecodePacket, DiskRequestPacket, PrintfPacket,
    SaveWritebackPacket, UpdateStatusPacket, UsbFlushedPacket, UsbPacket,
};
pub use registry::{PacketHandler, PacketRegistry, RawHandler, TypedHandler};
