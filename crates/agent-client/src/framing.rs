//! Length-prefixed JSON framing
//!
//! Each frame is a big-endian `u32` payload length followed by that many
//! bytes of JSON. Empty frames and frames over `MAX_FRAME_LEN` are rejected
//! before any payload is read.

use crate::error::AgentError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload (16 MiB)
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Writes one frame and flushes the stream.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), AgentError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| AgentError::Protocol(format!("frame of {} bytes exceeds limit", payload.len())))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, AgentError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(AgentError::Protocol("empty frame".to_string()));
    }
    if len > MAX_FRAME_LEN {
        return Err(AgentError::Protocol(format!("frame of {} bytes exceeds limit", len)));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Serializes `message` as JSON and writes it as one frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), AgentError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}

/// Reads one frame and parses it as JSON.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, AgentError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}
