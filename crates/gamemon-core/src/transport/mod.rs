//! The two relay transports.
//!
//! - `socket`: authenticated local TCP stream between host and monitor
//! - `stdio`: native-messaging frames between host and browser
//!
//! Both move opaque frame bodies; the relay pump forwards them through the
//! `FrameSource`/`FrameSink` traits without looking inside.

mod socket;
mod stdio;

use std::io::{Read, Write};

pub use socket::{
    SocketCloser, SocketConnection, SocketListener, SocketReceiver, SocketSender, connect,
    connect_with_retry,
};
pub use stdio::{BrowserReceiver, BrowserSender};

use crate::error::Result;

/// Something whole frames can be read from
pub trait FrameSource {
    /// Next frame body, `Ok(None)` at a clean end of stream
    fn recv_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Something whole frames can be written to
pub trait FrameSink {
    fn send_frame(&mut self, payload: &[u8]) -> Result<()>;
}

impl FrameSource for SocketReceiver {
    fn recv_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.recv()
    }
}

impl FrameSink for SocketSender {
    fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.send(payload)
    }
}

impl<R: Read> FrameSource for BrowserReceiver<R> {
    fn recv_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.recv()
    }
}

impl<W: Write> FrameSink for BrowserSender<W> {
    fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.send(payload)
    }
}
