//! Browser side of the relay: native messaging over stdin/stdout.

use std::io::{self, Read, Stdin, Stdout, Write};

use serde::Serialize;

use crate::error::Result;
use crate::protocol::{FrameReader, FrameWriter};

/// Reads frames sent by the browser
pub struct BrowserReceiver<R = Stdin> {
    reader: FrameReader<R>,
}

impl BrowserReceiver<Stdin> {
    pub fn stdin() -> Self {
        Self::new(io::stdin())
    }
}

impl<R: Read> BrowserReceiver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: FrameReader::new(inner),
        }
    }

    /// Next message body, `Ok(None)` when the browser closed the pipe
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_frame()
    }
}

/// Writes frames to the browser
pub struct BrowserSender<W = Stdout> {
    writer: FrameWriter<W>,
}

impl BrowserSender<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> BrowserSender<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: FrameWriter::new(inner),
        }
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_frame(payload)
    }

    /// Encode `message` as JSON and send it
    pub fn send_json<T: Serialize>(&mut self, message: &T) -> Result<()> {
        self.send(&serde_json::to_vec(message)?)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}
