//! Framed request/reply messages
//!
//! Every value travels as one frame: a 4-byte big-endian length followed by a
//! bincode-encoded [`Frame`]. `Null` frames and empty text mean "nothing yet"
//! and are skipped by readers; end of stream is reported explicitly.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame payload
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Cluster a database table
pub const CMD_DB: &str = "DB";
/// Load a saved model
pub const CMD_FILE: &str = "FILE";
/// Request accepted
pub const ACK: &str = "OK";
/// End of a response
pub const END: &str = "END";

/// One self-describing value on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Null,
    Text(String),
    Int(i64),
}

impl Frame {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// `Null` and empty text carry no value
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Int(_) => false,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(s) => write!(f, "text {:?}", s),
            Self::Int(n) => write!(f, "integer {}", n),
        }
    }
}

/// Reads and writes frames over a byte stream
#[derive(Debug)]
pub struct FrameStream<S> {
    stream: S,
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Next raw frame; `Ok(None)` on a clean end of stream between frames
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let mut header = [0u8; 4];
        if self.stream.read(&mut header[..1]).await? == 0 {
            return Ok(None);
        }
        self.stream.read_exact(&mut header[1..]).await.map_err(closed_on_eof)?;

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.map_err(closed_on_eof)?;

        bincode::deserialize(&payload)
            .map(Some)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(payload.len()));
        }
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ProtocolError> {
        self.write_frame(&Frame::Text(text.into())).await
    }

    /// Next non-empty frame, or `Ok(None)` if the peer closed the stream
    pub async fn next_value(&mut self) -> Result<Option<Frame>, ProtocolError> {
        while let Some(frame) = self.read_frame().await? {
            if !frame.is_empty() {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    /// Next non-empty frame; end of stream is an error
    pub async fn expect_value(&mut self) -> Result<Frame, ProtocolError> {
        self.next_value().await?.ok_or(ProtocolError::ConnectionClosed)
    }

    /// Next non-empty frame, which must be text
    pub async fn expect_text(&mut self) -> Result<String, ProtocolError> {
        match self.expect_value().await? {
            Frame::Text(s) => Ok(s),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: "text",
                found: other.to_string(),
            }),
        }
    }
}

fn closed_on_eof(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_cross_the_stream() {
        let (a, b) = duplex(1024);
        let mut left = FrameStream::new(a);
        let mut right = FrameStream::new(b);

        left.send_text("DB").await.unwrap();
        left.write_frame(&Frame::Int(3)).await.unwrap();

        assert_eq!(right.read_frame().await.unwrap(), Some(Frame::text("DB")));
        assert_eq!(right.read_frame().await.unwrap(), Some(Frame::Int(3)));
    }

    #[tokio::test]
    async fn test_empty_frames_are_skipped() {
        let (a, b) = duplex(1024);
        let mut left = FrameStream::new(a);
        let mut right = FrameStream::new(b);

        left.write_frame(&Frame::Null).await.unwrap();
        left.send_text("").await.unwrap();
        left.send_text("FILE").await.unwrap();

        assert_eq!(right.expect_text().await.unwrap(), "FILE");
    }

    #[tokio::test]
    async fn test_end_of_stream_is_explicit() {
        let (a, b) = duplex(1024);
        let mut right = FrameStream::new(b);
        drop(a);

        assert_eq!(right.next_value().await.unwrap(), None);
        assert!(matches!(
            right.expect_value().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let (mut a, b) = duplex(1024);
        let mut right = FrameStream::new(b);
        a.write_all(&[0, 0, 0, 9, 1, 2]).await.unwrap();
        drop(a);

        assert!(matches!(
            right.read_frame().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, b) = duplex(1024);
        let mut right = FrameStream::new(b);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        assert!(matches!(
            right.read_frame().await,
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_expect_text_rejects_integers() {
        let (a, b) = duplex(1024);
        let mut left = FrameStream::new(a);
        let mut right = FrameStream::new(b);
        left.write_frame(&Frame::Int(7)).await.unwrap();

        assert!(matches!(
            right.expect_text().await,
            Err(ProtocolError::UnexpectedFrame { expected: "text", .. })
        ));
    }
}
