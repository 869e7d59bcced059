use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on a single frame body. Anything larger is rejected before any
/// allocation happens for it.
pub const MAX_FRAME_LEN: u32 = 100 * 1024 * 1024;

/// Errors surfaced by the framing codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the socket at a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed the socket or an I/O error occurred mid-frame.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared length exceeds [`MAX_FRAME_LEN`]. The stream cannot be
    /// resynchronized after this.
    #[error("frame of {declared} bytes exceeds the {MAX_FRAME_LEN}-byte limit")]
    TooLarge { declared: u32 },

    /// The frame body is not valid UTF-8 JSON. The frame boundary itself is
    /// intact, so the connection may keep reading.
    #[error("malformed JSON frame: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl FrameError {
    /// Whether the connection can continue reading frames after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedJson(_))
    }
}

/// Read one length-prefixed JSON frame.
///
/// Returns `ConnectionClosed` when the peer disconnects cleanly before the
/// header. A zero-length frame decodes as an empty object.
pub async fn read_frame<R>(reader: &mut R) -> Result<Value, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_be_bytes(header);
    if len == 0 {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { declared: len });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    Ok(serde_json::from_slice(&body)?)
}

/// Serialize `value` and write it as one length-prefixed frame.
///
/// Header and body are written in a single call so a frame is never split
/// across an intervening write from the same task.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize + ?Sized,
{
    let body = serde_json::to_vec(value)?;
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        declared: u32::MAX,
    })?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { declared: len });
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    let frame = Bytes::from(frame);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
