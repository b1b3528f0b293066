//! Shared fixtures for the sender and receiver tests.

use std::path::Path;

use saknet_protocol::{DEFAULT_MAX_PAYLOAD, FileAck, Frame, FrameType};
use saknet_transfer::{TransferFileEntry, TransferObserver, checksum_bytes};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::READ_TIMEOUT;
use crate::channel::{FrameChannel, TcpFrameChannel};
use crate::options::DataOptions;

/// Session options for the end-to-end scenarios: all stages on, 64 KiB
/// chunks, passphrase `pw`, zero salt.
pub fn scenario_options(destination: &Path) -> DataOptions {
    DataOptions {
        transfer_id: "t".into(),
        passphrase: "pw".into(),
        salt: vec![0u8; 16],
        destination_base: destination.to_path_buf(),
        ..DataOptions::default()
    }
}

/// Same as [`scenario_options`] without encryption, for tests that do
/// not need the key derivation.
pub fn plain_options(destination: &Path) -> DataOptions {
    DataOptions {
        encryption_enabled: false,
        ..scenario_options(destination)
    }
}

/// Writes `data` under `dir` and returns the matching entry.
pub fn source_file(dir: &Path, relative_path: &str, data: &[u8]) -> TransferFileEntry {
    let path = dir.join(relative_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, data).unwrap();
    TransferFileEntry {
        file_id: format!("id-{relative_path}"),
        absolute_path: path,
        relative_path: relative_path.into(),
        size_bytes: data.len() as u64,
        checksum_sha256: checksum_bytes(data),
        acl_sddl: None,
    }
}

/// Cancels a token once a file reports at least `threshold` bytes.
pub struct CancelAfter {
    pub cancel: CancellationToken,
    pub threshold: u64,
}

impl TransferObserver for CancelAfter {
    fn file_progress(&self, _file_id: &str, bytes_done: u64, _total_bytes: u64) {
        if bytes_done >= self.threshold {
            self.cancel.cancel();
        }
    }
}

pub async fn loopback_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accepts one connection and wraps it in a frame channel.
pub async fn accept_channel(listener: TcpListener) -> TcpFrameChannel {
    let (stream, _) = listener.accept().await.unwrap();
    FrameChannel::from_tcp(stream, CancellationToken::new(), DEFAULT_MAX_PAYLOAD)
}

pub async fn connect_channel(port: u16) -> TcpFrameChannel {
    let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    FrameChannel::from_tcp(stream, CancellationToken::new(), DEFAULT_MAX_PAYLOAD)
}

/// Reads frames until `FileEnd`, returning the `DataChunk` frames seen.
pub async fn drain_file(channel: &mut TcpFrameChannel) -> Vec<Frame> {
    let mut chunks = Vec::new();
    loop {
        let frame = channel.recv(READ_TIMEOUT).await.unwrap();
        match frame.header.frame_type {
            FrameType::DataChunk => chunks.push(frame),
            FrameType::FileEnd => return chunks,
            other => panic!("unexpected {other:?} inside a file"),
        }
    }
}

pub async fn send_ack(channel: &mut TcpFrameChannel, ack: &FileAck) {
    channel
        .send(&Frame::json(FrameType::FileAck, ack, false).unwrap())
        .await
        .unwrap();
}
