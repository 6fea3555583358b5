//! Outbound side of the multiplexer.
//!
//! Messages are appended to one buffer as VLQ records and sent together as
//! a single `'U'` write when the buffer is flushed, typically once per
//! frame.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use super::{message_types, USB_MESSAGES};
use crate::client::Client;
use crate::codec::encode_record;
use crate::error::Result;

/// Batches application messages into USB writes.
pub struct Multiplexer {
    client: Client,
    buffer: Mutex<BytesMut>,
}

impl Multiplexer {
    /// Create a multiplexer sending through `client`.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            buffer: Mutex::new(BytesMut::new()),
        }
    }

    /// Append a message to the pending batch.
    pub fn queue(&self, message_type: u32, data: &[u8]) -> Result<()> {
        encode_record(&mut *self.buffer.lock(), message_type, data)
    }

    /// Ask the N64 to clear all sprites and entities.
    pub fn queue_reset(&self) -> Result<()> {
        self.queue(message_types::RESET, &[])
    }

    /// Tell the N64 the host has finished its setup.
    pub fn queue_ready(&self) -> Result<()> {
        self.queue(message_types::READY, &[])
    }

    /// Set the background colour (packed RGBA).
    pub fn queue_bg_color(&self, rgba: u32) -> Result<()> {
        self.queue(message_types::BG_COLOR, &rgba.to_be_bytes())
    }

    /// Update sprite `index`. An empty body removes it.
    pub fn queue_sprite(&self, index: u16, body: &[u8]) -> Result<()> {
        self.queue(message_types::SPRITE, &indexed(index, body))
    }

    /// Update entity `index`. An empty body removes it.
    pub fn queue_entity(&self, index: u16, body: &[u8]) -> Result<()> {
        self.queue(message_types::ENTITY, &indexed(index, body))
    }

    /// Bytes waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Send the pending batch as one USB write and clear it.
    ///
    /// Nothing is sent when no messages are queued.
    pub async fn flush(&self) -> Result<()> {
        let batch = self.take();
        if batch.is_empty() {
            return Ok(());
        }
        trace!(len = batch.len(), "flushing message batch");
        self.client.usb_write(USB_MESSAGES, batch).await?;
        Ok(())
    }

    /// Run a fixed-period loop: `tick` then [`flush`](Self::flush), until
    /// `shutdown` resolves.
    ///
    /// `tick` receives the frame counter, starting at zero.
    pub async fn run<S, F>(&self, period: Duration, shutdown: S, mut tick: F) -> Result<()>
    where
        S: Future<Output = ()>,
        F: FnMut(&Self, u64),
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut frame = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                _ = interval.tick() => {
                    tick(self, frame);
                    self.flush().await?;
                    frame += 1;
                }
            }
        }
    }

    fn take(&self) -> Bytes {
        self.buffer.lock().split().freeze()
    }
}

fn indexed(index: u16, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(2 + body.len());
    buf.put_u16(index);
    buf.put_slice(body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_body() {
        assert_eq!(&indexed(0x0102, b"xy")[..], &[0x01, 0x02, b'x', b'y']);
        assert_eq!(&indexed(7, b"")[..], &[0x00, 0x07]);
    }
}
