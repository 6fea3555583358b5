//! Integration tests for sc64-link.
//!
//! A simulated cart sits on the far end of an in-memory duplex stream and
//! answers commands by hand. DSR follows DTR one poll late, like the real
//! firmware acknowledging a reset.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use sc64_link::codec::{encode_record, Record, RecordFormat, Records};
use sc64_link::command::tags;
use sc64_link::handler::{ButtonPacket, PrintfPacket};
use sc64_link::mux::USB_MESSAGES;
use sc64_link::protocol::{CommandHeader, Frame, FrameKind, COMMAND_HEADER_SIZE};
use sc64_link::transport::ControlLines;
use sc64_link::{Client, ClientBuilder, Command, LinkError, SessionState};

/// DTR/DSR of the simulated cart.
struct CartLines {
    dtr: bool,
    dsr: bool,
    resets: Arc<AtomicUsize>,
}

impl ControlLines for CartLines {
    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        if level && !self.dtr {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
        self.dtr = level;
        Ok(())
    }

    fn dsr(&mut self) -> io::Result<bool> {
        let level = self.dsr;
        self.dsr = self.dtr;
        Ok(level)
    }
}

/// Device end of the link.
struct Cart {
    io: DuplexStream,
    resets: Arc<AtomicUsize>,
}

impl Cart {
    async fn command(&mut self) -> CommandHeader {
        let mut buf = [0u8; COMMAND_HEADER_SIZE];
        self.io.read_exact(&mut buf).await.unwrap();
        CommandHeader::decode(&buf).unwrap().unwrap()
    }

    async fn payload(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.io.read_exact(&mut buf).await.unwrap();
        buf
    }

    async fn send(&mut self, kind: FrameKind, tag: u8, payload: &[u8]) {
        let frame = Frame::new(kind, tag, Bytes::copy_from_slice(payload));
        self.io.write_all(&frame.encode()).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
    }

    fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

async fn connect(builder: ClientBuilder) -> (Client, Cart) {
    let (host, device) = duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(host);
    let resets = Arc::new(AtomicUsize::new(0));
    let lines = CartLines {
        dtr: false,
        dsr: false,
        resets: resets.clone(),
    };

    let client = builder.start(reader, writer, lines).await.unwrap();
    (client, Cart { io: device, resets })
}

fn usb_packet(packet_type: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(packet_type);
    buf.put_uint(data.len() as u64, 3);
    buf.put_slice(data);
    buf.to_vec()
}

#[tokio::test(start_paused = true)]
async fn test_identifier_round_trip() {
    let (client, mut cart) = connect(Client::builder()).await;
    assert_eq!(cart.resets(), 1);
    assert!(client.is_connected());

    let device = tokio::spawn(async move {
        let header = cart.command().await;
        assert_eq!(header.tag, b'v');
        assert_eq!((header.arg0, header.arg1), (0, 0));
        cart.send(FrameKind::Complete, b'v', b"SC64").await;
        cart
    });

    let reply = client.send_command(Command::new(tags::IDENTIFIER_GET)).await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.data, Bytes::from_static(b"SC64"));
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_version() {
    let (client, mut cart) = connect(Client::builder()).await;

    let device = tokio::spawn(async move {
        assert_eq!(cart.command().await.tag, b'v');
        cart.send(FrameKind::Complete, b'v', b"SC64").await;
        assert_eq!(cart.command().await.tag, b'V');
        cart.send(FrameKind::Complete, b'V', &[0, 2, 0, 17, 0, 0, 0, 0]).await;
        cart
    });

    let version = client.version().await.unwrap();
    assert_eq!(version.to_string(), "SC64 2.17.0");
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_error_reply() {
    let (client, mut cart) = connect(Client::builder()).await;

    let device = tokio::spawn(async move {
        let header = cart.command().await;
        assert_eq!(header.tag, b'm');
        assert_eq!(header.arg0, 0x1000_0000);
        assert_eq!(header.arg1, 16);
        cart.send(FrameKind::Error, b'm', &[]).await;
        cart
    });

    let result = client.memory_read(0x1000_0000, 16).await;
    assert!(matches!(result, Err(LinkError::CommandFailed { tag: b'm' })));
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_memory_write_forces_length() {
    let (client, mut cart) = connect(Client::builder()).await;

    let device = tokio::spawn(async move {
        let header = cart.command().await;
        assert_eq!(header.tag, b'M');
        assert_eq!(header.arg1, 5);
        assert_eq!(cart.payload(5).await, b"hello");
        cart.send(FrameKind::Complete, b'M', &[]).await;
        cart
    });

    client.memory_write(0x0400_0000, &b"hello"[..]).await.unwrap();
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_and_resyncs() {
    let (client, mut cart) = connect(Client::builder()).await;

    let start = Instant::now();
    let reply = client.send_command(Command::new(tags::VERSION_GET)).await.unwrap();

    assert!(!reply.success);
    assert!(reply.data.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert_eq!(cart.resets(), 2);
    assert!(client.is_connected());

    assert_eq!(cart.command().await.tag, b'V');

    let device = tokio::spawn(async move {
        assert_eq!(cart.command().await.tag, b'v');
        cart.send(FrameKind::Complete, b'v', b"SC64").await;
        cart
    });

    let reply = client.send_command(Command::new(tags::IDENTIFIER_GET)).await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.data, Bytes::from_static(b"SC64"));
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_literal_triggers_one_resync() {
    let (client, mut cart) = connect(Client::builder()).await;

    cart.send_raw(b"XYZv\x00\x00\x00\x00").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cart.resets(), 2);
    assert!(client.is_connected());

    let device = tokio::spawn(async move {
        assert_eq!(cart.command().await.tag, b'v');
        cart.send(FrameKind::Complete, b'v', b"SC64").await;
        cart
    });
    assert!(client.send_command(Command::new(b'v')).await.unwrap().success);
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_oversized_frame_triggers_resync() {
    let (client, mut cart) = connect(Client::builder().max_payload_size(16)).await;

    cart.send_raw(b"CMPv\x00\x00\x01\x00").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cart.resets(), 2);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_resync_abandons_pending_request() {
    let (client, mut cart) = connect(Client::builder()).await;

    let start = Instant::now();
    let waiter = client.clone();
    let request = tokio::spawn(async move { waiter.send_command(Command::new(b'm').arg1(4)).await });

    assert_eq!(cart.command().await.tag, b'm');
    assert!(client.resync().await);

    let reply = request.await.unwrap().unwrap();
    assert!(!reply.success);
    assert!(reply.data.is_empty());
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(cart.resets(), 2);

    // Late answer to the abandoned request goes nowhere.
    cart.send(FrameKind::Complete, b'm', b"late").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_same_tag_commands_are_serialized() {
    let (client, mut cart) = connect(Client::builder()).await;

    let device = tokio::spawn(async move {
        for answer in [&b"one"[..], &b"two"[..]] {
            assert_eq!(cart.command().await.tag, b'v');
            cart.send(FrameKind::Complete, b'v', answer).await;
        }
        cart
    });

    let (a, b) = tokio::join!(
        client.send_command(Command::new(b'v')),
        client.send_command(Command::new(b'v')),
    );

    let mut answers = vec![a.unwrap().data, b.unwrap().data];
    answers.sort();
    assert_eq!(answers, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_packets_are_dispatched_in_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let buttons = tx.clone();
    let texts = tx.clone();

    let builder = Client::builder()
        .on(move |_: ButtonPacket| {
            let _ = buttons.send("button".to_string());
        })
        .on(move |p: PrintfPacket| {
            let _ = texts.send(p.text);
        })
        .on_raw(b'X', move |payload| {
            let _ = tx.send(format!("aux {}", payload.len()));
        });
    let (_client, mut cart) = connect(builder).await;

    cart.send(FrameKind::Packet, b'B', &[]).await;
    cart.send(FrameKind::Packet, b'Q', b"unknown").await;
    cart.send(FrameKind::Packet, b'I', b"boot ok").await;
    cart.send(FrameKind::Packet, b'X', &[0, 0, 0, 1]).await;

    assert_eq!(rx.recv().await.unwrap(), "button");
    assert_eq!(rx.recv().await.unwrap(), "boot ok");
    assert_eq!(rx.recv().await.unwrap(), "aux 4");
}

#[tokio::test(start_paused = true)]
async fn test_usb_batch_is_demultiplexed() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let messages = tx.clone();
    let heartbeat = tx.clone();

    let builder = Client::builder()
        .on_message(3, move |data| {
            let _ = messages.send(Record::new(3, data));
        })
        .on_usb(5, move |data| {
            let _ = heartbeat.send(Record::new(0x500, data));
        })
        .on_input(move |input| {
            let _ = tx.send(Record::new(0, Bytes::copy_from_slice(&input.buttons.to_be_bytes())));
        });
    let (_client, mut cart) = connect(builder).await;

    let mut batch = BytesMut::new();
    encode_record(&mut batch, 3, b"first").unwrap();
    encode_record(&mut batch, 9, b"unhandled").unwrap();
    encode_record(&mut batch, 0, &[0x80, 0x01, 0, 0, 0, 0, 0, 0]).unwrap();
    encode_record(&mut batch, 3, b"").unwrap();

    cart.send(FrameKind::Packet, b'U', &usb_packet(5, b"")).await;
    cart.send(FrameKind::Packet, b'U', &usb_packet(USB_MESSAGES, &batch)).await;

    assert_eq!(rx.recv().await.unwrap(), Record::new(0x500, Bytes::new()));
    assert_eq!(rx.recv().await.unwrap(), Record::new(3, &b"first"[..]));
    assert_eq!(rx.recv().await.unwrap(), Record::new(0, &[0x80, 0x01][..]));
    assert_eq!(rx.recv().await.unwrap(), Record::new(3, Bytes::new()));
}

#[tokio::test(start_paused = true)]
async fn test_multiplexer_flush() {
    let (client, mut cart) = connect(Client::builder()).await;
    let mux = client.multiplexer();

    mux.queue(1, b"a").unwrap();
    mux.queue(2, b"bb").unwrap();
    mux.queue(3, b"").unwrap();
    mux.flush().await.unwrap();
    assert_eq!(mux.pending_len(), 0);

    let header = cart.command().await;
    assert_eq!(header.tag, b'U');
    assert_eq!(header.arg0, u32::from(USB_MESSAGES));
    let payload = cart.payload(header.arg1 as usize).await;

    let records: Vec<Record> = Records::new(Bytes::from(payload), RecordFormat::Vlq)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        records,
        vec![
            Record::new(1, &b"a"[..]),
            Record::new(2, &b"bb"[..]),
            Record::new(3, Bytes::new()),
        ]
    );

    // Nothing queued: nothing written.
    mux.flush().await.unwrap();
    let device = tokio::spawn(async move {
        assert_eq!(cart.command().await.tag, b'v');
        cart.send(FrameKind::Complete, b'v', b"SC64").await;
        cart
    });
    assert!(client.send_command(Command::new(b'v')).await.unwrap().success);
    device.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_multiplexer_sprite_and_entity() {
    let (client, mut cart) = connect(Client::builder()).await;
    let mux = client.multiplexer();

    mux.queue_reset().unwrap();
    mux.queue_sprite(2, b"px").unwrap();
    mux.queue_entity(0x0102, b"e").unwrap();
    mux.queue_bg_color(0x1122_33FF).unwrap();
    mux.flush().await.unwrap();

    let header = cart.command().await;
    let payload = cart.payload(header.arg1 as usize).await;
    let records: Vec<Record> = Records::new(Bytes::from(payload), RecordFormat::Vlq)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        records,
        vec![
            Record::new(0, Bytes::new()),
            Record::new(3, &[0x00, 0x02, b'p', b'x'][..]),
            Record::new(4, &[0x01, 0x02, b'e'][..]),
            Record::new(2, &[0x11, 0x22, 0x33, 0xFF][..]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_multiplexer_tick_loop() {
    let (client, mut cart) = connect(Client::builder()).await;
    let mux = client.multiplexer();

    let mut frames = Vec::new();
    mux.run(
        Duration::from_millis(16),
        tokio::time::sleep(Duration::from_millis(40)),
        |mux, frame| {
            frames.push(frame);
            mux.queue(1, &[frame as u8]).unwrap();
        },
    )
    .await
    .unwrap();

    assert_eq!(frames, vec![0, 1, 2]);

    for frame in 0..3u8 {
        let header = cart.command().await;
        assert_eq!(header.tag, b'U');
        let payload = cart.payload(header.arg1 as usize).await;
        assert_eq!(payload, vec![0x01, 0x01, frame]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_port_close_ends_session() {
    let (client, cart) = connect(Client::builder()).await;

    drop(cart);
    client.wait_for_shutdown().await.unwrap();

    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(
        client.send_command(Command::new(b'v')).await,
        Err(LinkError::ConnectionClosed)
    ));
}
