//! Link session: receive loop, reply correlation and resync.
//!
//! ```text
//!            ┌──────────── Session ─────────────┐
//! Serial ──► │ read_loop ─► FrameBuffer ─► route│──► pending[tag] (CMP/ERR)
//!            │                                  │──► PacketRegistry (PKT)
//!            │ resync ─► ControlLines (DTR/DSR) │
//!            └──────────────────────────────────┘
//! ```
//!
//! At most one request per tag is pending; callers serialize same-tag
//! commands through [`Session::tag_lock`]. A resync abandons every pending
//! request and discards buffered input. Only one handshake runs at a time;
//! a resync requested while one is running waits for it and reports its
//! outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::command::Reply;
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::handler::PacketRegistry;
use crate::protocol::{Frame, FrameBuffer, FrameKind, HEADER_SIZE};
use crate::transport::{handshake, ControlLines};
use crate::writer::WriterHandle;

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No handshake has succeeded, the last one failed, or the port closed.
    Disconnected,
    /// A handshake is running.
    Resyncing,
    /// Framing is aligned with the device.
    Connected,
}

/// State shared by the client, the read loop and spawned resyncs.
pub(crate) struct Session {
    pub(crate) writer: WriterHandle,
    pub(crate) config: LinkConfig,
    pending: Mutex<HashMap<u8, oneshot::Sender<Reply>>>,
    tag_locks: Mutex<HashMap<u8, Arc<tokio::sync::Mutex<()>>>>,
    /// Also serializes handshakes.
    lines: tokio::sync::Mutex<Box<dyn ControlLines>>,
    /// Bumped whenever buffered input must be discarded.
    epoch: AtomicU64,
    state: watch::Sender<SessionState>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(writer: WriterHandle, lines: Box<dyn ControlLines>, config: LinkConfig) -> Self {
        Self {
            writer,
            config,
            pending: Mutex::new(HashMap::new()),
            tag_locks: Mutex::new(HashMap::new()),
            lines: tokio::sync::Mutex::new(lines),
            epoch: AtomicU64::new(0),
            state: watch::channel(SessionState::Disconnected).0,
            closed: watch::channel(false).0,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "session state changed");
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Lock serializing commands with the same tag.
    pub(crate) fn tag_lock(&self, tag: u8) -> Arc<tokio::sync::Mutex<()>> {
        self.tag_locks.lock().entry(tag).or_default().clone()
    }

    /// Register a pending request for `tag`.
    ///
    /// The receiver resolves with the reply, or errors if the request is
    /// abandoned.
    pub(crate) fn register(&self, tag: u8) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(tag, tx).is_some() {
            warn!(tag = %char::from(tag), "replaced an outstanding request");
        }
        rx
    }

    /// Drop the pending request for `tag`, if any.
    pub(crate) fn forget(&self, tag: u8) {
        self.pending.lock().remove(&tag);
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Abandon every pending request. Waiters observe a closed channel.
    fn abandon_pending(&self) {
        let abandoned: Vec<_> = self.pending.lock().drain().collect();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "abandoning pending requests");
        }
    }

    fn complete(&self, tag: u8, reply: Reply) {
        let pending = self.pending.lock().remove(&tag);
        match pending {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!(
                tag = %char::from(tag),
                success = reply.success,
                "reply with no pending request"
            ),
        }
    }

    /// Route one inbound frame.
    pub(crate) fn route(&self, frame: Frame, registry: &PacketRegistry) {
        match frame.kind {
            FrameKind::Complete => self.complete(frame.tag, Reply::complete(frame.payload)),
            FrameKind::Error => self.complete(frame.tag, Reply::error(frame.payload)),
            FrameKind::Packet => dispatch_packet(registry, frame.tag, frame.payload),
            FrameKind::Command => debug!(tag = %frame.tag_char(), "ignoring inbound command frame"),
        }
    }

    /// Run the DTR/DSR handshake and realign with the device.
    ///
    /// Returns `true` if the session is `Connected` afterwards.
    pub(crate) async fn resync(&self) -> bool {
        let mut lines = match self.lines.try_lock() {
            Ok(lines) => lines,
            Err(_) => {
                debug!("resync already running, waiting for its outcome");
                drop(self.lines.lock().await);
                return self.state() == SessionState::Connected;
            }
        };

        if self.is_closed() {
            return false;
        }

        self.set_state(SessionState::Resyncing);
        self.discard_input();

        let config = &self.config;
        let acknowledged =
            handshake(&mut **lines, config.handshake_polls, config.handshake_poll_interval).await;

        match acknowledged {
            Ok(true) => {
                self.discard_input();
                self.set_state(SessionState::Connected);
                info!("link synchronized");
                true
            }
            Ok(false) => {
                self.set_state(SessionState::Disconnected);
                warn!(polls = config.handshake_polls, "handshake not acknowledged");
                false
            }
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                warn!(error = %e, "handshake failed");
                false
            }
        }
    }

    fn discard_input(&self) {
        self.abandon_pending();
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the link as gone for good.
    pub(crate) fn close(&self) {
        self.set_state(SessionState::Disconnected);
        self.abandon_pending();
        self.closed.send_replace(true);
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once [`close`](Self::close) has run.
    pub(crate) async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

fn dispatch_packet(registry: &PacketRegistry, tag: u8, payload: Bytes) {
    match registry.dispatch(tag, payload) {
        Ok(()) => {}
        Err(LinkError::HandlerNotFound(tag)) => {
            warn!(tag = %char::from(tag), "unknown packet, dropped")
        }
        Err(e) => warn!(tag = %char::from(tag), error = %e, "packet dropped"),
    }
}

/// Read frames until the port closes.
///
/// Framing faults clear the buffer and start a resync in the background so
/// the loop keeps draining the port while the handshake runs.
pub(crate) async fn read_loop<R>(
    mut reader: R,
    session: Arc<Session>,
    registry: PacketRegistry,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let config = &session.config;
    let mut frame_buffer = FrameBuffer::with_max_payload(config.max_payload_size);
    let mut buf = vec![0u8; config.read_buffer_size.max(HEADER_SIZE)];
    let mut frames = Vec::new();
    let mut epoch = session.epoch();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(LinkError::Io(e)),
        };

        let current = session.epoch();
        if current != epoch {
            frame_buffer.clear();
            epoch = current;
        }

        let result = frame_buffer.push_into(&buf[..n], &mut frames);

        for frame in frames.drain(..) {
            session.route(frame, &registry);
        }

        if let Err(e) = result {
            warn!(error = %e, "lost frame alignment, resynchronizing");
            frame_buffer.clear();
            let session = session.clone();
            tokio::spawn(async move {
                session.resync().await;
            });
        }
    }
}
