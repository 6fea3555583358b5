//! Inbound side of the multiplexer.
//!
//! Installed as the handler for `'U'` packets. The USB packet type picks a
//! handler; type `0xFF` is unpacked here into records, each routed by its
//! application message type.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::input::ControllerInput;
use super::{message_types, USB_HEARTBEAT, USB_MESSAGES};
use crate::codec::{RecordFormat, Records};
use crate::error::Result;
use crate::handler::{DecodePacket, PacketHandler, UsbPacket};

type Callback = Box<dyn Fn(Bytes) + Send + Sync>;

/// Routes USB packets and the records inside batched ones.
pub struct Demux {
    format: RecordFormat,
    usb_handlers: HashMap<u8, Callback>,
    message_handlers: HashMap<u32, Callback>,
}

impl Demux {
    /// Create a demultiplexer decoding batches with `format`.
    pub fn new(format: RecordFormat) -> Self {
        Self {
            format,
            usb_handlers: HashMap::new(),
            message_handlers: HashMap::new(),
        }
    }

    /// Change the record framing of batched payloads.
    pub fn set_format(&mut self, format: RecordFormat) {
        self.format = format;
    }

    /// Handle USB packets of `packet_type`.
    ///
    /// Batched messages (`0xFF`) are decoded internally and cannot be
    /// overridden; use [`Demux::on_message`] instead.
    pub fn on_usb<F>(&mut self, packet_type: u8, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        if packet_type == USB_MESSAGES {
            warn!("ignoring handler for batched USB messages, register per message type");
            return;
        }
        self.usb_handlers.insert(packet_type, Box::new(handler));
    }

    /// Handle application messages of `message_type`.
    pub fn on_message<F>(&mut self, message_type: u32, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.message_handlers.insert(message_type, Box::new(handler));
    }

    /// Handle decoded controller input messages.
    pub fn on_input<F>(&mut self, handler: F)
    where
        F: Fn(ControllerInput) + Send + Sync + 'static,
    {
        self.on_message(message_types::INPUT, move |data| {
            match ControllerInput::decode(&data) {
                Ok(input) => handler(input),
                Err(e) => warn!(error = %e, "dropping controller input"),
            }
        });
    }

    /// Route one USB packet.
    pub fn handle(&self, packet: UsbPacket) {
        if packet.packet_type == USB_MESSAGES {
            self.handle_batch(packet.data);
            return;
        }

        match self.usb_handlers.get(&packet.packet_type) {
            Some(handler) => handler(packet.data),
            None if packet.packet_type == USB_HEARTBEAT => trace!("heartbeat"),
            None => debug!(
                packet_type = packet.packet_type,
                len = packet.data.len(),
                "unhandled USB packet"
            ),
        }
    }

    fn handle_batch(&self, payload: Bytes) {
        for record in Records::new(payload, self.format) {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "discarding rest of message batch");
                    break;
                }
            };

            match self.message_handlers.get(&record.message_type) {
                Some(handler) => handler(record.data),
                None => debug!(
                    message_type = record.message_type,
                    len = record.data.len(),
                    "unhandled USB message"
                ),
            }
        }
    }
}

impl PacketHandler for Demux {
    fn call(&self, payload: Bytes) -> Result<()> {
        self.handle(UsbPacket::decode(payload)?);
        Ok(())
    }
}
