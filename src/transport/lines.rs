//! Modem control lines used by the reset handshake.
//!
//! The cart acknowledges DTR on DSR:
//!
//! ```text
//! host  DTR ──┐ set ............... clear ┌──
//! cart  DSR ──────┐ set ............... clear ┌──
//! ```
//!
//! Each phase is polled at a fixed cadence; see [`handshake`].

use std::io;
use std::time::Duration;

use tracing::debug;

/// DTR output and DSR input of a serial port.
pub trait ControlLines: Send + 'static {
    /// Drive DTR.
    fn set_dtr(&mut self, level: bool) -> io::Result<()>;

    /// Sample DSR.
    fn dsr(&mut self) -> io::Result<bool>;
}

impl<T: ControlLines + ?Sized> ControlLines for Box<T> {
    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        (**self).set_dtr(level)
    }

    fn dsr(&mut self) -> io::Result<bool> {
        (**self).dsr()
    }
}

/// Run the DTR/DSR reset handshake.
///
/// 1. Assert DTR, then read DSR up to `polls` times, `interval` apart, for it to go high.
/// 2. Deassert DTR, then poll DSR the same way for it to go low.
///
/// Returns `Ok(false)` if either phase exhausts its budget. DTR is left
/// deasserted in every case except an I/O error.
pub async fn handshake<L>(lines: &mut L, polls: u32, interval: Duration) -> io::Result<bool>
where
    L: ControlLines + ?Sized,
{
    lines.set_dtr(true)?;
    let acknowledged = wait_for_dsr(lines, true, polls, interval).await?;
    lines.set_dtr(false)?;
    if !acknowledged {
        debug!(polls, "DSR never asserted");
        return Ok(false);
    }

    if !wait_for_dsr(lines, false, polls, interval).await? {
        debug!(polls, "DSR never released");
        return Ok(false);
    }

    Ok(true)
}

async fn wait_for_dsr<L>(lines: &mut L, level: bool, polls: u32, interval: Duration) -> io::Result<bool>
where
    L: ControlLines + ?Sized,
{
    let mut count = 0;
    while count < polls && lines.dsr()? != level {
        tokio::time::sleep(interval).await;
        count += 1;
    }
    Ok(count < polls)
}
