//! Three-way split of a serial port.
//!
//! The link needs a read half for the receive loop, a write half for the
//! writer task and the control lines for the handshake, all at once.
//! `tokio::io::split` hides the inner port, so the port is shared behind a
//! mutex that is only held for the duration of a single poll or line
//! access.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::ControlLines;

/// Read half of a split port.
pub struct PortReader<T> {
    port: Arc<Mutex<T>>,
}

/// Write half of a split port.
pub struct PortWriter<T> {
    port: Arc<Mutex<T>>,
}

/// Control-line half of a split port.
pub struct PortLines<T> {
    port: Arc<Mutex<T>>,
}

/// Split a port into reader, writer and control lines.
pub fn split_port<T>(port: T) -> (PortReader<T>, PortWriter<T>, PortLines<T>)
where
    T: AsyncRead + AsyncWrite + ControlLines + Unpin,
{
    let port = Arc::new(Mutex::new(port));
    (
        PortReader { port: port.clone() },
        PortWriter { port: port.clone() },
        PortLines { port },
    )
}

impl<T: AsyncRead + Unpin> AsyncRead for PortReader<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut port = self.port.lock();
        Pin::new(&mut *port).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for PortWriter<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut port = self.port.lock();
        Pin::new(&mut *port).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let mut port = self.port.lock();
        Pin::new(&mut *port).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.port.lock().is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut port = self.port.lock();
        Pin::new(&mut *port).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut port = self.port.lock();
        Pin::new(&mut *port).poll_shutdown(cx)
    }
}

impl<T: ControlLines> ControlLines for PortLines<T> {
    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        self.port.lock().set_dtr(level)
    }

    fn dsr(&mut self) -> io::Result<bool> {
        self.port.lock().dsr()
    }
}
