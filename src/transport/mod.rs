//! # Ingestion Transport
//!
//! Wire format shared by the ingestion server and the worker-side client.
//! Every frame is a 4-byte little-endian length followed by a bincode
//! payload. A connection carries any number of request/reply exchanges:
//! the client writes a [`RecordBatch`](crate::events::RecordBatch) frame and
//! reads back a [`RecordReply`](crate::events::RecordReply) frame.

use crate::error::FrameError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub mod tcp;

pub use tcp::{IngestionClient, IngestionServer};

/// Largest accepted frame payload (1 GiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024 * 1024;

/// Upper bound on writing one frame before the peer is considered stuck
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read one length-prefixed frame and decode it
///
/// A clean end of stream before the length prefix is reported as
/// [`FrameError::Closed`].
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Closed)
        }
        Err(e) => return Err(e.into()),
    }

    let frame_len = u32::from_le_bytes(len_bytes) as usize;
    if frame_len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(frame_len));
    }

    let mut data = vec![0u8; frame_len];
    reader.read_exact(&mut data).await?;

    Ok(bincode::deserialize(&data)?)
}

/// Encode and write one length-prefixed frame
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serialize(message)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(bytes.len()));
    }
    let frame_len = bytes.len() as u32;

    let write_fut = async {
        writer.write_all(&frame_len.to_le_bytes()).await?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(()) as Result<(), std::io::Error>
    };

    match timeout(WRITE_TIMEOUT, write_fut).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(FrameError::Io(e)),
        Err(_) => Err(FrameError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCategory, EventsRecord, RecordBatch, RecordReply};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_frame_exchange() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let batch = RecordBatch::new(vec![EventsRecord::new(EventCategory::Sent)
            .with_event("m-1", Utc.timestamp_opt(100, 250).unwrap())]);

        write_frame(&mut client, &batch).await.unwrap();
        let decoded: RecordBatch = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, batch);

        write_frame(&mut server, &RecordReply { count: 1 }).await.unwrap();
        let reply: RecordReply = read_frame(&mut client).await.unwrap();
        assert_eq!(reply.count, 1);
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result: Result<RecordReply, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_le_bytes()).await.unwrap();

        let result: Result<RecordBatch, _> = read_frame(&mut server).await;
        assert!(matches!(result, Err(FrameError::TooLarge(_))));
    }
}
