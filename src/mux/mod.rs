//! Message multiplexer - application messages inside USB packets.
//!
//! ```text
//! outbound: queue(type, data)* ─► flush ─► CMD 'U' arg0=0xFF
//! inbound:  PKT 'U' ─► Demux ─► type 0xFF ─► Records ─► on_message(type)
//!                             └► other types ─► on_usb(type)
//! ```

mod demux;
mod input;
mod multiplexer;

pub use demux::Demux;
pub use input::{Button, ControllerInput, INPUT_SIZE};
pub use multiplexer::Multiplexer;

/// USB packet type sent by the N64 when it (re)starts.
pub const USB_HEARTBEAT: u8 = 5;

/// USB packet type carrying a batch of application messages.
pub const USB_MESSAGES: u8 = 0xFF;

/// Application message types.
pub mod message_types {
    /// Inbound: controller state.
    pub const INPUT: u32 = 0;

    /// Outbound: clear sprites and entities.
    pub const RESET: u32 = 0;
    /// Outbound: host setup finished.
    pub const READY: u32 = 1;
    /// Outbound: background colour.
    pub const BG_COLOR: u32 = 2;
    /// Outbound: sprite update.
    pub const SPRITE: u32 = 3;
    /// Outbound: entity update.
    pub const ENTITY: u32 = 4;
}
