//! Client builder and command API.
//!
//! The [`ClientBuilder`] provides a fluent API for registering packet and
//! message handlers and tuning the link. Starting it:
//! 1. Spawns the writer task on the write half
//! 2. Spawns the read loop on the read half
//! 3. Runs the DTR/DSR handshake
//!
//! # Example
//!
//! ```ignore
//! use sc64_link::handler::ButtonPacket;
//! use sc64_link::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .on(|_: ButtonPacket| println!("button"))
//!         .on_input(|input| println!("{:?}", input))
//!         .connect("/dev/ttyUSB0")
//!         .await?;
//!
//!     println!("{}", client.version().await?);
//!     client.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::RecordFormat;
use crate::command::{tags, Command, Reply, Version};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::handler::{self, DecodePacket, PacketRegistry, PrintfPacket};
use crate::mux::{ControllerInput, Demux, Multiplexer};
use crate::session::{read_loop, Session, SessionState};
use crate::transport::{split_port, ControlLines};
use crate::writer::spawn_writer_task;

/// Builder for configuring and starting a [`Client`].
pub struct ClientBuilder {
    registry: PacketRegistry,
    demux: Demux,
    config: LinkConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            registry: PacketRegistry::new(),
            demux: Demux::new(RecordFormat::default()),
            config: LinkConfig::default(),
        }
    }

    /// Handle unsolicited packets of type `P`.
    ///
    /// Handlers run on the receive loop and must not block.
    pub fn on<P, F>(mut self, handler: F) -> Self
    where
        P: DecodePacket,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.registry.register(handler);
        self
    }

    /// Handle the raw payload of packet `tag`.
    ///
    /// Registering `'U'` here replaces the USB demultiplexer.
    pub fn on_raw<F>(mut self, tag: u8, handler: F) -> Self
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.registry.register_raw(tag, handler);
        self
    }

    /// Handle USB packets of `packet_type`.
    pub fn on_usb<F>(mut self, packet_type: u8, handler: F) -> Self
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.demux.on_usb(packet_type, handler);
        self
    }

    /// Handle application messages of `message_type` from batched USB
    /// packets.
    pub fn on_message<F>(mut self, message_type: u32, handler: F) -> Self
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.demux.on_message(message_type, handler);
        self
    }

    /// Handle controller input messages.
    pub fn on_input<F>(mut self, handler: F) -> Self
    where
        F: Fn(ControllerInput) + Send + Sync + 'static,
    {
        self.demux.on_input(handler);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the reply timeout.
    ///
    /// Default: 500 ms
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the DSR poll budget per handshake phase.
    ///
    /// Default: 10
    pub fn handshake_polls(mut self, polls: u32) -> Self {
        self.config.handshake_polls = polls;
        self
    }

    /// Set the delay between DSR polls.
    ///
    /// Default: 10 ms
    pub fn handshake_poll_interval(mut self, interval: Duration) -> Self {
        self.config.handshake_poll_interval = interval;
        self
    }

    /// Set the upper bound on the initial handshake.
    ///
    /// Default: 1 s
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the largest accepted inbound payload.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the record framing of inbound message batches.
    ///
    /// Default: [`RecordFormat::Vlq`]
    pub fn record_format(mut self, format: RecordFormat) -> Self {
        self.config.record_format = format;
        self
    }

    /// Open the serial port at `path` and start the client on it.
    #[cfg(feature = "serial")]
    pub async fn connect(self, path: impl AsRef<std::path::Path>) -> Result<Client> {
        let port = crate::transport::serial::open(path)?;
        self.start_port(port).await
    }

    /// Start the client on a port that carries both data and control lines.
    pub async fn start_port<T>(self, port: T) -> Result<Client>
    where
        T: AsyncRead + AsyncWrite + ControlLines + Unpin,
    {
        let (reader, writer, lines) = split_port(port);
        self.start(reader, writer, lines).await
    }

    /// Start the client on separate read, write and control-line halves.
    ///
    /// Fails with [`LinkError::HandshakeFailed`] if the initial handshake
    /// does not complete within the connect timeout.
    pub async fn start<R, W, L>(self, reader: R, writer: W, lines: L) -> Result<Client>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        L: ControlLines,
    {
        let ClientBuilder {
            mut registry,
            mut demux,
            config,
        } = self;

        if !registry.contains(handler::tags::PRINTF) {
            registry.register(|packet: PrintfPacket| {
                info!(target: "sc64::printf", "{}", packet.text.trim_end());
            });
        }

        if registry.contains(handler::tags::USB) {
            debug!("raw USB packet handler registered, demultiplexer disabled");
        } else {
            demux.set_format(config.record_format);
            registry.insert(handler::tags::USB, Box::new(demux));
        }

        let connect_timeout = config.connect_timeout;
        let (writer, writer_task) = spawn_writer_task(writer, config.channel_capacity);
        let session = Arc::new(Session::new(writer, Box::new(lines), config));

        let read_session = session.clone();
        let read_task = tokio::spawn(async move {
            match read_loop(reader, read_session.clone(), registry).await {
                Ok(()) => info!("serial port closed"),
                Err(e) => error!(error = %e, "read loop failed"),
            }
            read_session.close();
        });

        let client = Client {
            session: session.clone(),
            tasks: Arc::new(Tasks {
                session,
                read: read_task,
                writer: writer_task,
            }),
        };

        match tokio::time::timeout(connect_timeout, client.resync()).await {
            Ok(true) => Ok(client),
            Ok(false) | Err(_) => Err(LinkError::HandshakeFailed),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Background tasks, stopped when the last [`Client`] clone is dropped.
struct Tasks {
    session: Arc<Session>,
    read: JoinHandle<()>,
    writer: JoinHandle<Result<()>>,
}

impl Drop for Tasks {
    fn drop(&mut self) {
        self.read.abort();
        self.writer.abort();
        self.session.close();
    }
}

/// A running link to the cart.
///
/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct Client {
    session: Arc<Session>,
    tasks: Arc<Tasks>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Send a command and wait for its reply.
    ///
    /// - Fire-and-forget commands (`'U'`) succeed as soon as they are queued.
    /// - Other commands wait for `CMP`/`ERR` up to the command timeout. On
    ///   timeout the link is resynchronized and a failed reply is returned.
    /// - A request abandoned by a resync also returns a failed reply.
    ///
    /// Commands with the same tag are serialized.
    pub async fn send_command(&self, command: Command) -> Result<Reply> {
        if self.session.is_closed() {
            return Err(LinkError::ConnectionClosed);
        }

        let tag = command.tag;
        if command.is_fire_and_forget() {
            self.session.writer.send(command.into_frame()).await?;
            return Ok(Reply::complete(Bytes::new()));
        }

        let lock = self.session.tag_lock(tag);
        let _turn = lock.lock().await;

        let reply = self.session.register(tag);
        if let Err(e) = self.session.writer.send(command.into_frame()).await {
            self.session.forget(tag);
            return Err(e);
        }

        let timeout = self.session.config.command_timeout;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                debug!(tag = %char::from(tag), "request abandoned");
                Ok(Reply::failed())
            }
            Err(_) => {
                warn!(
                    tag = %char::from(tag),
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out, resynchronizing"
                );
                self.session.forget(tag);
                self.session.resync().await;
                Ok(Reply::failed())
            }
        }
    }

    /// Shorthand for [`send_command`](Self::send_command).
    pub async fn command(
        &self,
        tag: u8,
        arg0: u32,
        arg1: u32,
        data: impl Into<Bytes>,
    ) -> Result<Reply> {
        let command = Command::new(tag).arg0(arg0).arg1(arg1).data(data);
        self.send_command(command).await
    }

    /// Read the cart identifier (`"SC64"`).
    pub async fn identifier(&self) -> Result<String> {
        let data = self
            .send_command(Command::new(tags::IDENTIFIER_GET))
            .await?
            .into_result(tags::IDENTIFIER_GET)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Read the identifier and firmware version.
    pub async fn version(&self) -> Result<Version> {
        let identifier = self.identifier().await?;
        let data = self
            .send_command(Command::new(tags::VERSION_GET))
            .await?
            .into_result(tags::VERSION_GET)?;
        Version::decode(identifier, &data)
    }

    /// Send a USB packet to the N64. Never waits for a reply.
    pub async fn usb_write(&self, packet_type: u8, data: impl Into<Bytes>) -> Result<Reply> {
        let command = Command::new(tags::USB_WRITE)
            .arg0(u32::from(packet_type))
            .data(data);
        self.send_command(command).await
    }

    /// Write `data` to cart memory at `address`.
    pub async fn memory_write(&self, address: u32, data: impl Into<Bytes>) -> Result<()> {
        let command = Command::new(tags::MEMORY_WRITE).arg0(address).data(data);
        self.send_command(command)
            .await?
            .into_result(tags::MEMORY_WRITE)
            .map(|_| ())
    }

    /// Read `length` bytes of cart memory at `address`.
    pub async fn memory_read(&self, address: u32, length: u32) -> Result<Bytes> {
        let command = Command::new(tags::MEMORY_READ).arg0(address).arg1(length);
        self.send_command(command)
            .await?
            .into_result(tags::MEMORY_READ)
    }

    /// Run the DTR/DSR handshake now.
    ///
    /// Returns `true` if the link is connected afterwards. Pending
    /// requests are abandoned either way.
    pub async fn resync(&self) -> bool {
        self.session.resync().await
    }

    /// Current link state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Check if the link is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Watch link state transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Commands waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.session.pending_count()
    }

    /// Commands queued but not yet written.
    pub fn pending_writes(&self) -> usize {
        self.session.writer.pending_count()
    }

    /// A message multiplexer sending through this client.
    pub fn multiplexer(&self) -> Multiplexer {
        Multiplexer::new(self.clone())
    }

    /// Stop the background tasks and abandon pending requests.
    pub fn shutdown(&self) {
        self.tasks.read.abort();
        self.session.close();
    }

    /// Wait until the port closes or [`shutdown`](Self::shutdown) is called.
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        self.session.closed().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ButtonPacket, UsbFlushedPacket};
    use std::io;

    struct Lines {
        dtr: bool,
        dsr: bool,
    }

    impl ControlLines for Lines {
        fn set_dtr(&mut self, level: bool) -> io::Result<()> {
            self.dtr = level;
            Ok(())
        }

        fn dsr(&mut self) -> io::Result<bool> {
            let level = self.dsr;
            self.dsr = self.dtr;
            Ok(level)
        }
    }

    fn lines() -> Lines {
        Lines {
            dtr: false,
            dsr: false,
        }
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Client::builder()
            .on(|_: ButtonPacket| {})
            .on(|_: UsbFlushedPacket| {})
            .on_raw(b'Z', |_| {})
            .on_usb(0x10, |_| {})
            .on_message(3, |_| {})
            .command_timeout(Duration::from_millis(100))
            .handshake_polls(20)
            .record_format(RecordFormat::Legacy);

        assert!(builder.registry.contains(b'B'));
        assert!(builder.registry.contains(b'G'));
        assert!(builder.registry.contains(b'Z'));
        assert_eq!(builder.config.command_timeout, Duration::from_millis(100));
        assert_eq!(builder.config.handshake_polls, 20);
        assert_eq!(builder.config.record_format, RecordFormat::Legacy);
    }

    #[test]
    fn test_builder_default() {
        let builder = ClientBuilder::default();
        assert!(builder.registry.is_empty());
        assert_eq!(builder.config, LinkConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects() {
        let (near, _far) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(near);

        let client = Client::builder().start(reader, writer, lines()).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(*client.state_changes().borrow(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fails_without_handshake() {
        struct Silent;
        impl ControlLines for Silent {
            fn set_dtr(&mut self, _level: bool) -> io::Result<()> {
                Ok(())
            }
            fn dsr(&mut self) -> io::Result<bool> {
                Ok(false)
            }
        }

        let (near, _far) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(near);

        let result = Client::builder().start(reader, writer, Silent).await;
        assert!(matches!(result, Err(LinkError::HandshakeFailed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_and_forget_does_not_wait() {
        let (near, _far) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(near);
        let client = Client::builder().start(reader, writer, lines()).await.unwrap();

        let reply = client.usb_write(0xFF, &b"abc"[..]).await.unwrap();
        assert!(reply.success);
        assert!(reply.data.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_completes_wait() {
        let (near, _far) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(near);
        let client = Client::builder().start(reader, writer, lines()).await.unwrap();

        client.shutdown();
        client.wait_for_shutdown().await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(matches!(
            client.send_command(Command::new(tags::IDENTIFIER_GET)).await,
            Err(LinkError::ConnectionClosed)
        ));
    }
}
