//! Length-prefixed framing shared by both transports.
//!
//! Each frame is a 4-byte little-endian unsigned length followed by that many
//! payload bytes. This is the browser native-messaging wire format; the local
//! socket uses it as well.

use std::io::{self, ErrorKind, Read, Write};

use crate::config::transport::MAX_FRAME_LEN;
use crate::error::{Error, Result};

pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one frame body.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a length
    /// prefix. End of stream anywhere inside a frame is an error.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; 4];
        if !self.fill_prefix(&mut prefix)? {
            return Ok(None);
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body)?;
        Ok(Some(body))
    }

    /// Fill the prefix; `false` if the stream was already at its end
    fn fill_prefix(&mut self, prefix: &mut [u8; 4]) -> Result<bool> {
        let mut filled = 0;
        while filled < prefix.len() {
            match self.inner.read(&mut prefix[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "stream ended inside a length prefix",
                    )
                    .into());
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame and flush it
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }

        self.inner.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(payload: &[u8]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(payload).unwrap();
        let encoded = writer.into_inner();
        assert_eq!(encoded.len(), payload.len() + 4);

        let mut reader = FrameReader::new(Cursor::new(encoded));
        let decoded = reader.read_frame().unwrap().unwrap();
        assert!(reader.read_frame().unwrap().is_none());
        decoded
    }

    #[test]
    fn test_roundtrip_sizes() {
        for size in [0usize, 1, 255, 256, 4096, 65535, 65536, 65537, 200_000] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            assert_eq!(roundtrip(&payload), payload, "size {}", size);
        }
    }

    #[test]
    fn test_prefix_is_little_endian() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(br#"{"version":"1.0"}"#).unwrap();
        let encoded = writer.into_inner();
        assert_eq!(&encoded[..4], &[17, 0, 0, 0]);
        assert_eq!(&encoded[4..], br#"{"version":"1.0"}"#);
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"first").unwrap();
        writer.write_frame(b"").unwrap();
        writer.write_frame(b"third").unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"first");
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"");
        assert_eq!(reader.read_frame().unwrap().unwrap(), b"third");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_clean_eof_on_empty_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_truncated_prefix_is_error() {
        let mut reader = FrameReader::new(Cursor::new(vec![5, 0]));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_truncated_body_is_error() {
        let mut reader = FrameReader::new(Cursor::new(vec![5, 0, 0, 0, b'a', b'b']));
        assert!(reader.read_frame().unwrap_err().is_disconnect());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        let mut reader = FrameReader::new(Cursor::new(len.to_vec()));
        assert!(matches!(
            reader.read_frame(),
            Err(Error::FrameTooLarge { .. })
        ));
    }
}
