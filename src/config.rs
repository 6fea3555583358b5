//! Link configuration.
//!
//! Every field has a default matching the cart firmware, so a config file
//! only needs to list what it overrides. Durations are given in
//! milliseconds:
//!
//! ```
//! use sc64_link::LinkConfig;
//! use std::time::Duration;
//!
//! let config: LinkConfig = serde_json::from_str(r#"{ "command_timeout": 250 }"#).unwrap();
//! assert_eq!(config.command_timeout, Duration::from_millis(250));
//! assert_eq!(config.handshake_polls, 10);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::codec::RecordFormat;
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Time a command waits for its `CMP`/`ERR` reply before a resync.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// DSR polls per handshake phase.
pub const DEFAULT_HANDSHAKE_POLLS: u32 = 10;

/// Delay between DSR polls.
pub const DEFAULT_HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time `connect` waits for the initial handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Read chunk size of the receive loop.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Tunables of a link session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Reply timeout for commands that expect one.
    #[serde(with = "millis")]
    pub command_timeout: Duration,
    /// DSR polls per handshake phase.
    pub handshake_polls: u32,
    /// Delay between DSR polls.
    #[serde(with = "millis")]
    pub handshake_poll_interval: Duration,
    /// Upper bound on the initial handshake in `connect`.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Largest inbound payload accepted before the stream is considered
    /// desynchronized.
    pub max_payload_size: u32,
    /// Read chunk size.
    pub read_buffer_size: usize,
    /// Writer queue depth.
    pub channel_capacity: usize,
    /// Framing of records inside batched USB payloads.
    pub record_format: RecordFormat,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            handshake_polls: DEFAULT_HANDSHAKE_POLLS,
            handshake_poll_interval: DEFAULT_HANDSHAKE_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            record_format: RecordFormat::Vlq,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
