//! Authenticated local TCP link between the host and the monitor.
//!
//! The host listens, the monitor connects. The connecting side sends the
//! shared key as its first frame and the listener answers with a welcome or
//! failure frame. After that both directions carry one message per frame.

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::transport::{FAILURE, WELCOME};
use crate::error::{Error, Result};
use crate::protocol::{EventMessage, FrameReader, FrameWriter};
use crate::retry::RetryStrategy;
use crate::shutdown::ShutdownSignal;

/// How long either side waits for the other's handshake frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

fn keys_match(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub struct SocketListener {
    listener: TcpListener,
    auth_key: String,
}

impl SocketListener {
    pub fn bind(address: SocketAddr, auth_key: &str) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        debug!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            auth_key: auth_key.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Block until a peer completes the handshake. Peers that present the
    /// wrong key are dropped and the listener keeps waiting.
    pub fn accept_authenticated(&self) -> Result<SocketConnection> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            match self.handshake(stream) {
                Ok(connection) => {
                    info!("Monitor connected from {}", peer);
                    return Ok(connection);
                }
                Err(e) => warn!("Rejected connection from {}: {}", peer, e),
            }
        }
    }

    fn handshake(&self, stream: TcpStream) -> Result<SocketConnection> {
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let mut reader = FrameReader::new(&stream);
        let mut writer = FrameWriter::new(&stream);

        let key = reader.read_frame()?.ok_or(Error::ConnectionClosed)?;
        if !keys_match(self.auth_key.as_bytes(), &key) {
            let _ = writer.write_frame(FAILURE);
            return Err(Error::AuthenticationFailed("key mismatch".to_string()));
        }
        writer.write_frame(WELCOME)?;

        stream.set_read_timeout(None)?;
        SocketConnection::new(stream)
    }
}

/// Single connection attempt including the handshake
pub fn connect(address: SocketAddr, auth_key: &str) -> Result<SocketConnection> {
    connect_within(address, auth_key, HANDSHAKE_TIMEOUT)
}

/// A listener that accepts but never replies fails the attempt after
/// `timeout` instead of blocking the retry loop forever.
fn connect_within(
    address: SocketAddr,
    auth_key: &str,
    timeout: Duration,
) -> Result<SocketConnection> {
    let stream = TcpStream::connect_timeout(&address, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    FrameWriter::new(&stream).write_frame(auth_key.as_bytes())?;

    let reply = FrameReader::new(&stream)
        .read_frame()?
        .ok_or(Error::ConnectionClosed)?;
    if reply != WELCOME {
        return Err(Error::AuthenticationFailed(
            "listener refused the key".to_string(),
        ));
    }

    stream.set_read_timeout(None)?;
    SocketConnection::new(stream)
}

/// Connect, retrying according to `retry` until it succeeds.
///
/// Returns `Ok(None)` if shutdown was signaled while waiting.
pub fn connect_with_retry<S: RetryStrategy>(
    address: SocketAddr,
    auth_key: &str,
    retry: &mut S,
    shutdown: &ShutdownSignal,
) -> Result<Option<SocketConnection>> {
    let mut attempts = 0u32;

    loop {
        if shutdown.is_shutdown() {
            return Ok(None);
        }

        attempts += 1;
        let error = match connect(address, auth_key) {
            Ok(connection) => {
                info!("Connected to host at {} (attempt {})", address, attempts);
                return Ok(Some(connection));
            }
            Err(e) => e,
        };

        let Some(delay) = retry.next_delay(attempts) else {
            return Err(error);
        };
        debug!(
            "Connection to {} failed ({}), retrying in {}ms",
            address,
            error,
            delay.as_millis()
        );

        if shutdown.wait(delay) {
            return Ok(None);
        }
    }
}

/// An authenticated stream, before it is split into halves
pub struct SocketConnection {
    stream: TcpStream,
}

impl SocketConnection {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Handle that can close the stream from another thread
    pub fn closer(&self) -> Result<SocketCloser> {
        Ok(SocketCloser(self.stream.try_clone()?))
    }

    pub fn split(self) -> Result<(SocketSender, SocketReceiver)> {
        let read_half = self.stream.try_clone()?;
        Ok((
            SocketSender {
                writer: FrameWriter::new(self.stream),
            },
            SocketReceiver {
                reader: FrameReader::new(BufReader::new(read_half)),
            },
        ))
    }
}

pub struct SocketSender {
    writer: FrameWriter<TcpStream>,
}

impl SocketSender {
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_frame(payload)
    }

    pub fn send_event(&mut self, event: &EventMessage) -> Result<()> {
        self.send(&event.to_vec()?)
    }
}

pub struct SocketReceiver {
    reader: FrameReader<BufReader<TcpStream>>,
}

impl SocketReceiver {
    /// Next frame, `Ok(None)` once the peer has closed the stream
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_frame()
    }
}

pub struct SocketCloser(TcpStream);

impl SocketCloser {
    /// Shut down both directions, unblocking any pending read
    pub fn close(&self) {
        if let Err(e) = self.0.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }
    }
}
