//! Relay pump: copies frames between the browser and the monitor.
//!
//! Each direction runs on its own thread and forwards frames unmodified and
//! in order. The directions are independent of each other.

use std::sync::mpsc;
use std::thread;

use strum::Display;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::{FrameSink, FrameSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[strum(serialize = "browser -> monitor")]
    BrowserToMonitor,
    #[strum(serialize = "monitor -> browser")]
    MonitorToBrowser,
}

/// Why the pump stopped: the first direction to finish
#[derive(Debug)]
pub struct PumpExit {
    pub direction: Direction,
    /// Frames forwarded on success (source reached a clean end of stream)
    pub outcome: Result<u64>,
}

/// Forward frames from `source` to `sink` until the source ends.
///
/// Returns the number of frames forwarded.
pub fn forward<S: FrameSource, D: FrameSink>(
    source: &mut S,
    sink: &mut D,
    direction: Direction,
) -> Result<u64> {
    let mut forwarded = 0u64;

    while let Some(frame) = source.recv_frame()? {
        trace!("{}: {} bytes", direction, frame.len());
        sink.send_frame(&frame)?;
        forwarded += 1;
    }

    debug!("{}: source closed after {} frames", direction, forwarded);
    Ok(forwarded)
}

/// Start both directions and block until the first one finishes.
///
/// The other direction keeps running on its thread; callers are expected to
/// exit the process once this returns.
pub fn run_pump<BR, BS, MR, MS>(
    mut browser_rx: BR,
    mut browser_tx: BS,
    mut monitor_rx: MR,
    mut monitor_tx: MS,
) -> PumpExit
where
    BR: FrameSource + Send + 'static,
    BS: FrameSink + Send + 'static,
    MR: FrameSource + Send + 'static,
    MS: FrameSink + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();

    let upstream = done_tx.clone();
    thread::spawn(move || {
        let direction = Direction::BrowserToMonitor;
        let outcome = forward(&mut browser_rx, &mut monitor_tx, direction);
        let _ = upstream.send(PumpExit { direction, outcome });
    });

    thread::spawn(move || {
        let direction = Direction::MonitorToBrowser;
        let outcome = forward(&mut monitor_rx, &mut browser_tx, direction);
        let _ = done_tx.send(PumpExit { direction, outcome });
    });

    done_rx.recv().unwrap_or_else(|_| PumpExit {
        direction: Direction::MonitorToBrowser,
        outcome: Err(Error::ConnectionClosed),
    })
}
