//! Frame transport with per-read timeouts and cooperative cancellation.

use std::time::Duration;

use saknet_protocol::Frame;
use saknet_protocol::io::{read_frame, write_frame};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;

use crate::error::DataChannelError;
use crate::{READ_TIMEOUT, TCP_BUFFER_SIZE};

/// Frame channel over a split TCP stream.
pub type TcpFrameChannel = FrameChannel<BufReader<OwnedReadHalf>, BufWriter<OwnedWriteHalf>>;

/// Reads and writes whole frames, racing every operation against the
/// session's cancellation token.
pub struct FrameChannel<R, W> {
    reader: R,
    writer: W,
    cancel: CancellationToken,
    max_payload: u32,
}

impl FrameChannel<BufReader<OwnedReadHalf>, BufWriter<OwnedWriteHalf>> {
    /// Splits `stream` and wraps both halves in `TCP_BUFFER_SIZE` buffers.
    pub fn from_tcp(stream: TcpStream, cancel: CancellationToken, max_payload: u32) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(
            BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
            cancel,
            max_payload,
        )
    }
}

impl<R, W> FrameChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, cancel: CancellationToken, max_payload: u32) -> Self {
        Self {
            reader,
            writer,
            cancel,
            max_payload,
        }
    }

    /// Writes and flushes one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), DataChannelError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataChannelError::Cancelled),
            result = tokio::time::timeout(READ_TIMEOUT, write_frame(&mut self.writer, frame)) => {
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => Err(DataChannelError::Timeout),
                }
            }
        }
    }

    /// Reads the next frame, waiting at most `timeout`.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Frame, DataChannelError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataChannelError::Cancelled),
            result = tokio::time::timeout(timeout, read_frame(&mut self.reader, self.max_payload)) => {
                match result {
                    Ok(Ok(frame)) => Ok(frame),
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => Err(DataChannelError::Timeout),
                }
            }
        }
    }

    /// Flushes and half-closes the write side.
    pub async fn shutdown(&mut self) -> Result<(), DataChannelError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<(), DataChannelError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DataChannelError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
