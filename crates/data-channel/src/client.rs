//! Sender side: connects to a receiver and streams a batch of files.

use std::sync::Arc;

use saknet_protocol::{AckStatus, FileAck, FileHeaderPayload, Frame, FrameType, ResumeInfo};
use saknet_transfer::{
    BandwidthLimit, BandwidthRegulator, ChunkRanges, ChunkReader, NoopObserver, TransferFileEntry,
    TransferObserver, chunk_count,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{self, FrameChannel};
use crate::error::DataChannelError;
use crate::options::DataOptions;
use crate::pipeline::ChunkCodec;
use crate::{ACK_TIMEOUT, CONNECT_TIMEOUT, MAX_ATTEMPTS, READ_TIMEOUT, report_outcome};

/// What a completed send did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub files_sent: usize,
    /// Plaintext bytes put on the wire, retries included.
    pub bytes_sent: u64,
    /// Plaintext bytes skipped because the receiver already had them.
    pub bytes_skipped: u64,
    /// File attempts across the batch (one per file when nothing retried).
    pub attempts: u32,
}

enum AckOutcome {
    Ok,
    Retry,
}

/// Running state of one batch.
struct Batch<'a> {
    codec: &'a ChunkCodec,
    regulator: BandwidthRegulator,
    summary: SendSummary,
    done_bytes: u64,
    total_bytes: u64,
}

/// Sends files to a [`TransferReceiver`](crate::TransferReceiver).
pub struct TransferSender {
    options: DataOptions,
    cancel: CancellationToken,
    observer: Arc<dyn TransferObserver>,
    bandwidth: BandwidthLimit,
}

impl TransferSender {
    pub fn new(options: DataOptions, cancel: CancellationToken) -> Self {
        let bandwidth = BandwidthLimit::new(options.max_bandwidth_kbps);
        Self {
            options,
            cancel,
            observer: Arc::new(NoopObserver),
            bandwidth,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shares a host-owned bandwidth handle instead of the one built from
    /// `max_bandwidth_kbps`.
    pub fn with_bandwidth_limit(mut self, limit: BandwidthLimit) -> Self {
        self.bandwidth = limit;
        self
    }

    /// Handle for re-tuning the bandwidth cap while a send is running.
    pub fn bandwidth_limit(&self) -> BandwidthLimit {
        self.bandwidth.clone()
    }

    /// Connects to `host:port` and sends every file in order.
    ///
    /// Emits exactly one `transfer_completed` to the observer, preceded by
    /// `error_occurred` on failure. On cancellation no `TransferEnd` is
    /// sent and the receiver is left to resume later.
    pub async fn connect_and_send(
        &self,
        host: &str,
        port: u16,
        files: &[TransferFileEntry],
    ) -> Result<SendSummary, DataChannelError> {
        let result = self.run(host, port, files).await;
        report_outcome(self.observer.as_ref(), &result, "all files sent");
        result
    }

    async fn run(
        &self,
        host: &str,
        port: u16,
        files: &[TransferFileEntry],
    ) -> Result<SendSummary, DataChannelError> {
        self.options.validate()?;
        let codec = ChunkCodec::from_options(&self.options).await?;

        let stream = self.connect(host, port).await?;
        stream.set_nodelay(true)?;
        self.observer.transfer_started();

        let mut channel =
            FrameChannel::from_tcp(stream, self.cancel.clone(), self.options.max_frame_payload);
        self.send_batch(&mut channel, &codec, files).await
    }

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, DataChannelError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataChannelError::Cancelled),
            result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))) => {
                match result {
                    Ok(Ok(s)) => {
                        info!(host, port, "data channel connected");
                        Ok(s)
                    }
                    Ok(Err(e)) => Err(DataChannelError::ConnectionFailed(format!(
                        "connect to {host}:{port}: {e}"
                    ))),
                    Err(_) => Err(DataChannelError::Timeout),
                }
            }
        }
    }

    async fn send_batch<R, W>(
        &self,
        channel: &mut FrameChannel<R, W>,
        codec: &ChunkCodec,
        files: &[TransferFileEntry],
    ) -> Result<SendSummary, DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut batch = Batch {
            codec,
            regulator: BandwidthRegulator::new(self.bandwidth.clone()),
            summary: SendSummary::default(),
            done_bytes: 0,
            total_bytes: files.iter().map(|f| f.size_bytes).sum(),
        };

        for file in files {
            if self.cancel.is_cancelled() {
                return Err(DataChannelError::Cancelled);
            }

            self.observer
                .file_started(&file.file_id, &file.relative_path, file.size_bytes);

            let mut delivered = false;
            for attempt in 1..=MAX_ATTEMPTS {
                batch.summary.attempts += 1;
                info!(
                    file_id = %file.file_id,
                    path = %file.relative_path,
                    size = file.size_bytes,
                    attempt,
                    "sending file"
                );

                match self.send_attempt(channel, &mut batch, file).await? {
                    AckOutcome::Ok => {
                        delivered = true;
                        break;
                    }
                    AckOutcome::Retry => {
                        warn!(file_id = %file.file_id, attempt, "receiver asked for a retry");
                    }
                }
            }

            if !delivered {
                return Err(DataChannelError::RetryExhausted {
                    file_id: file.file_id.clone(),
                    attempts: MAX_ATTEMPTS,
                });
            }

            batch.done_bytes += file.size_bytes;
            batch.summary.files_sent += 1;
            self.observer.file_completed(&file.file_id, &file.relative_path);
        }

        channel.send(&Frame::empty(FrameType::TransferEnd)).await?;
        channel.shutdown().await?;

        let summary = batch.summary;
        info!(
            files = summary.files_sent,
            bytes_sent = summary.bytes_sent,
            bytes_skipped = summary.bytes_skipped,
            "transfer complete"
        );
        Ok(summary)
    }

    /// One header → chunks → end → ack round for `file`.
    async fn send_attempt<R, W>(
        &self,
        channel: &mut FrameChannel<R, W>,
        batch: &mut Batch<'_>,
        file: &TransferFileEntry,
    ) -> Result<AckOutcome, DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let chunk_size = self.options.chunk_size;
        let total_chunks = chunk_count(file.size_bytes, chunk_size)?;
        let header = FileHeaderPayload {
            file_id: file.file_id.clone(),
            relative_path: file.relative_path.clone(),
            size_bytes: file.size_bytes,
            checksum_sha256: file.checksum_sha256.clone(),
            chunk_size,
            acl_sddl: file.acl_sddl.clone(),
        };
        channel
            .send(&Frame::json(FrameType::FileHeader, &header, true)?)
            .await?;

        let skip = if self.options.resume_enabled {
            self.recv_resume(channel, &file.file_id, total_chunks).await?
        } else {
            ChunkRanges::new()
        };

        let mut reader = ChunkReader::open(&file.absolute_path, file.size_bytes, chunk_size).await?;
        let mut file_bytes = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(DataChannelError::Cancelled);
            }

            if skip.contains(reader.next_id()) {
                let Some(len) = reader.skip_chunk().await? else {
                    break;
                };
                file_bytes += len;
                batch.summary.bytes_skipped += len;
            } else {
                let Some(chunk) = reader.next_chunk().await? else {
                    break;
                };
                let frame = batch.codec.seal(chunk.id, &chunk.data, chunk.is_last)?;
                channel.send(&frame).await?;
                debug!(
                    file_id = %file.file_id,
                    chunk_id = chunk.id,
                    plain_size = chunk.len(),
                    payload_size = frame.header.payload_size,
                    last = chunk.is_last,
                    "chunk sent"
                );

                let len = chunk.len() as u64;
                file_bytes += len;
                batch.summary.bytes_sent += len;
                if let Some(delay) = batch.regulator.record(len) {
                    channel::sleep(&self.cancel, delay).await?;
                }
            }

            self.observer
                .file_progress(&file.file_id, file_bytes, file.size_bytes);
            self.observer
                .overall_progress(batch.done_bytes + file_bytes, batch.total_bytes);
        }

        channel.send(&Frame::empty(FrameType::FileEnd)).await?;
        self.recv_ack(channel, &file.file_id).await
    }

    /// Reads the receiver's `ResumeInfo` for `file_id`, dropping any late
    /// `FileAck` from an earlier timed-out attempt.
    async fn recv_resume<R, W>(
        &self,
        channel: &mut FrameChannel<R, W>,
        file_id: &str,
        total_chunks: u32,
    ) -> Result<ChunkRanges, DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let frame = channel.recv(READ_TIMEOUT).await?;
            match frame.header.frame_type {
                FrameType::ResumeInfo => {
                    let info: ResumeInfo = frame.parse_json()?;
                    if info.file_id != file_id || info.total_chunks != total_chunks {
                        return Err(DataChannelError::Protocol(format!(
                            "ResumeInfo for {}/{} chunks, expected {file_id}/{total_chunks}",
                            info.file_id, info.total_chunks
                        )));
                    }
                    let ranges = ChunkRanges::from_pairs(info.ranges);
                    if !ranges.is_empty() {
                        info!(file_id, ranges = ?ranges.as_slice(), "resuming");
                    }
                    return Ok(ranges);
                }
                FrameType::FileAck => {
                    debug!(file_id, "discarding stale FileAck");
                }
                other => {
                    return Err(DataChannelError::Protocol(format!(
                        "expected ResumeInfo, got {other:?}"
                    )));
                }
            }
        }
    }

    async fn recv_ack<R, W>(
        &self,
        channel: &mut FrameChannel<R, W>,
        file_id: &str,
    ) -> Result<AckOutcome, DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let frame = match channel.recv(ACK_TIMEOUT).await {
            Ok(frame) => frame,
            Err(DataChannelError::Timeout) => {
                warn!(file_id, "no FileAck before timeout");
                return Ok(AckOutcome::Retry);
            }
            Err(e) => return Err(e),
        };

        if frame.header.frame_type != FrameType::FileAck {
            return Err(DataChannelError::Protocol(format!(
                "expected FileAck, got {:?}",
                frame.header.frame_type
            )));
        }

        let ack: FileAck = match frame.parse_json() {
            Ok(ack) => ack,
            Err(e) => {
                warn!(file_id, error = %e, "unreadable FileAck");
                return Ok(AckOutcome::Retry);
            }
        };
        if ack.file_id != file_id {
            return Err(DataChannelError::Protocol(format!(
                "FileAck for {}, expected {file_id}",
                ack.file_id
            )));
        }

        Ok(match ack.status {
            AckStatus::Ok => AckOutcome::Ok,
            AckStatus::Retry => AckOutcome::Retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::TransferReceiver;
    use crate::testing::{
        CancelAfter, accept_channel, drain_file, loopback_listener, plain_options,
        scenario_options, send_ack, source_file,
    };
    use saknet_protocol::FrameFlags;
    use saknet_transfer::{ChannelObserver, TransferEvent, checksum_bytes, pacing_delay};
    use std::time::Duration;

    /// Full pipeline over loopback: receiver task plus sender.
    async fn run_pair(
        sender: TransferSender,
        receiver: TransferReceiver,
        files: &[TransferFileEntry],
    ) -> (
        Result<SendSummary, DataChannelError>,
        Result<crate::ReceiveSummary, DataChannelError>,
    ) {
        let listener = receiver.listen("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move { receiver.accept_and_receive(listener).await });
        let sent = sender.connect_and_send("127.0.0.1", port, files).await;
        (sent, handle.await.unwrap())
    }

    #[tokio::test]
    async fn single_small_file() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "a.txt", b"helloworld")];

        let (observer, mut events) = ChannelObserver::channel();
        let sender = TransferSender::new(scenario_options(dest.path()), CancellationToken::new())
            .with_observer(Arc::new(observer));
        let receiver =
            TransferReceiver::new(scenario_options(dest.path()), CancellationToken::new());

        let (sent, received) = run_pair(sender, receiver, &files).await;
        let sent = sent.unwrap();
        let received = received.unwrap();

        assert_eq!(sent.files_sent, 1);
        assert_eq!(sent.bytes_sent, 10);
        assert_eq!(sent.attempts, 1);
        assert_eq!(received.files_received, 1);
        assert_eq!(received.bytes_received, 10);

        let out = std::fs::read(dest.path().join("a.txt")).unwrap();
        assert_eq!(out, b"helloworld");
        assert_eq!(checksum_bytes(&out), files[0].checksum_sha256);
        assert!(!dest.path().join("a.txt.partial").exists());
        assert!(!dest.path().join("a.txt.resume.json").exists());

        let mut seen = Vec::new();
        while let Ok(e) = events.try_recv() {
            seen.push(e);
        }
        assert_eq!(seen.first(), Some(&TransferEvent::TransferStarted));
        assert_eq!(
            seen.last(),
            Some(&TransferEvent::TransferCompleted {
                success: true,
                message: "all files sent".into()
            })
        );
        let completions = seen
            .iter()
            .filter(|e| matches!(e, TransferEvent::TransferCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn multi_chunk_frames_on_the_wire() {
        let src = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "zeros.bin", &vec![0u8; 200_000])];
        let (listener, port) = loopback_listener().await;

        let peer = tokio::spawn(async move {
            let mut channel = accept_channel(listener).await;
            let header = channel.recv(READ_TIMEOUT).await.unwrap();
            assert_eq!(header.header.frame_type, FrameType::FileHeader);
            let header: FileHeaderPayload = header.parse_json().unwrap();
            channel
                .send(
                    &Frame::json(
                        FrameType::ResumeInfo,
                        &ResumeInfo {
                            file_id: header.file_id.clone(),
                            total_chunks: 4,
                            ranges: vec![],
                        },
                        true,
                    )
                    .unwrap(),
                )
                .await
                .unwrap();
            let chunks = drain_file(&mut channel).await;
            send_ack(&mut channel, &FileAck::ok(&header.file_id)).await;
            let end = channel.recv(READ_TIMEOUT).await.unwrap();
            assert_eq!(end.header.frame_type, FrameType::TransferEnd);
            chunks
        });

        let dest = tempfile::tempdir().unwrap();
        let sender = TransferSender::new(plain_options(dest.path()), CancellationToken::new());
        let summary = sender
            .connect_and_send("127.0.0.1", port, &files)
            .await
            .unwrap();
        assert_eq!(summary.bytes_sent, 200_000);

        let chunks = peer.await.unwrap();
        let ids: Vec<u32> = chunks.iter().map(|f| f.header.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(chunks[3].header.plain_size, 3392);
        assert!(chunks[3].header.flags.contains(FrameFlags::LAST_CHUNK));
        assert!(chunks[..3]
            .iter()
            .all(|f| !f.header.flags.contains(FrameFlags::LAST_CHUNK)));
        assert!(chunks
            .iter()
            .all(|f| f.header.flags.contains(FrameFlags::COMPRESSED)));
    }

    #[tokio::test]
    async fn multi_chunk_file_exact_size() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "zeros.bin", &vec![0u8; 200_000])];

        let sender = TransferSender::new(scenario_options(dest.path()), CancellationToken::new());
        let receiver =
            TransferReceiver::new(scenario_options(dest.path()), CancellationToken::new());
        let (sent, received) = run_pair(sender, receiver, &files).await;
        sent.unwrap();
        received.unwrap();

        let meta = std::fs::metadata(dest.path().join("zeros.bin")).unwrap();
        assert_eq!(meta.len(), 200_000);
    }

    #[tokio::test]
    async fn shared_bandwidth_handle_paces_the_send() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "paced.bin", &vec![7u8; 200_000])];

        let limit = BandwidthLimit::new(256);
        let sender = TransferSender::new(plain_options(dest.path()), CancellationToken::new())
            .with_bandwidth_limit(limit.clone());
        assert_eq!(sender.bandwidth_limit().kbps(), 256);
        let receiver = TransferReceiver::new(plain_options(dest.path()), CancellationToken::new());

        // The regulator sleeps after every chunk, the last included, so the
        // whole file is paced to its expected duration (~762 ms).
        let expected = pacing_delay(200_000, 256, Duration::ZERO).unwrap();
        let started = std::time::Instant::now();
        let (sent, received) = run_pair(sender, receiver, &files).await;
        sent.unwrap();
        received.unwrap();

        let elapsed = started.elapsed();
        let rounding = Duration::from_millis(5);
        assert!(elapsed + rounding >= expected, "{elapsed:?} < {expected:?}");
        assert!(
            elapsed < expected + Duration::from_millis(750),
            "{elapsed:?} far over {expected:?}"
        );

        limit.set_kbps(0);
        assert_eq!(limit.kbps(), 0);
    }

    #[tokio::test]
    async fn batch_with_subdirectories_and_empty_file() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let noisy: Vec<u8> = (0..150_000u32).map(|i| (i * 7 + i / 13) as u8).collect();
        let files = vec![
            source_file(src.path(), "game.exe", b"EXECUTABLE_DATA"),
            source_file(src.path(), "assets/textures/hero.png", &noisy),
            source_file(src.path(), "empty.txt", b""),
        ];

        for (encryption, compression) in [(false, false), (true, false), (false, true)] {
            let dest_dir = dest.path().join(format!("{encryption}-{compression}"));
            let options = DataOptions {
                encryption_enabled: encryption,
                compression_enabled: compression,
                chunk_size: 16 * 1024,
                ..scenario_options(&dest_dir)
            };
            let sender = TransferSender::new(options.clone(), CancellationToken::new());
            let receiver = TransferReceiver::new(options, CancellationToken::new());
            let (sent, received) = run_pair(sender, receiver, &files).await;

            assert_eq!(sent.unwrap().files_sent, 3);
            assert_eq!(received.unwrap().files_received, 3);
            assert_eq!(
                std::fs::read(dest_dir.join("game.exe")).unwrap(),
                b"EXECUTABLE_DATA"
            );
            assert_eq!(
                std::fs::read(dest_dir.join("assets/textures/hero.png")).unwrap(),
                noisy
            );
            assert!(std::fs::read(dest_dir.join("empty.txt")).unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn interrupted_transfer_resumes() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let files = vec![source_file(src.path(), "a.txt", &data)];

        // First run: stop once chunks 0 and 1 are on the wire.
        let cancel = CancellationToken::new();
        let sender = TransferSender::new(scenario_options(dest.path()), cancel.clone())
            .with_observer(Arc::new(CancelAfter {
                cancel,
                threshold: 131_072,
            }));
        let receiver =
            TransferReceiver::new(scenario_options(dest.path()), CancellationToken::new());
        let (sent, received) = run_pair(sender, receiver, &files).await;

        assert!(matches!(sent, Err(DataChannelError::Cancelled)));
        assert!(received.is_err());
        assert!(!dest.path().join("a.txt").exists());
        let partial = std::fs::metadata(dest.path().join("a.txt.partial")).unwrap();
        assert_eq!(partial.len(), 131_072);
        let ledger: ResumeInfo =
            serde_json::from_slice(&std::fs::read(dest.path().join("a.txt.resume.json")).unwrap())
                .unwrap();
        assert_eq!(ledger.ranges, vec![(0, 1)]);

        // Second run with the same options picks up at chunk 2.
        let sender = TransferSender::new(scenario_options(dest.path()), CancellationToken::new());
        let receiver =
            TransferReceiver::new(scenario_options(dest.path()), CancellationToken::new());
        let (sent, received) = run_pair(sender, receiver, &files).await;

        let sent = sent.unwrap();
        received.unwrap();
        assert_eq!(sent.bytes_skipped, 131_072);
        assert_eq!(sent.bytes_sent, 68_928);
        assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), data);
        assert!(!dest.path().join("a.txt.partial").exists());
        assert!(!dest.path().join("a.txt.resume.json").exists());
    }

    /// Fake receiver that answers `retry` a fixed number of times per file.
    async fn retrying_peer(listener: tokio::net::TcpListener, retries: u32) -> u32 {
        let mut channel = accept_channel(listener).await;
        let mut attempts = 0;
        loop {
            // The sender hangs up after its last attempt.
            let Ok(frame) = channel.recv(READ_TIMEOUT).await else {
                return attempts;
            };
            match frame.header.frame_type {
                FrameType::FileHeader => {
                    let header: FileHeaderPayload = frame.parse_json().unwrap();
                    drain_file(&mut channel).await;
                    attempts += 1;
                    let ack = if attempts <= retries {
                        FileAck::retry(&header.file_id)
                    } else {
                        FileAck::ok(&header.file_id)
                    };
                    send_ack(&mut channel, &ack).await;
                }
                FrameType::TransferEnd => return attempts,
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn retry_twice_then_ok() {
        let src = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "a.txt", b"helloworld")];
        let (listener, port) = loopback_listener().await;
        let peer = tokio::spawn(retrying_peer(listener, 2));

        let options = DataOptions {
            resume_enabled: false,
            ..plain_options(src.path())
        };
        let sender = TransferSender::new(options, CancellationToken::new());
        let summary = sender
            .connect_and_send("127.0.0.1", port, &files)
            .await
            .unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.files_sent, 1);
        assert_eq!(summary.bytes_sent, 30);
        assert_eq!(peer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn retry_with_resume_skips_reported_chunks_and_stale_acks() {
        let src = tempfile::tempdir().unwrap();
        let data = vec![3u8; 100_000];
        let files = vec![source_file(src.path(), "b.bin", &data)];
        let (listener, port) = loopback_listener().await;

        // First attempt: nothing on disk, answer retry. Second attempt: a
        // late ack from the first attempt arrives ahead of ResumeInfo
        // reporting chunk 0 as present.
        let peer = tokio::spawn(async move {
            let mut channel = accept_channel(listener).await;
            let mut seen = Vec::new();
            for (attempt, ranges) in [vec![], vec![(0, 0)]].into_iter().enumerate() {
                let header: FileHeaderPayload = channel
                    .recv(READ_TIMEOUT)
                    .await
                    .unwrap()
                    .parse_json()
                    .unwrap();
                if attempt > 0 {
                    send_ack(&mut channel, &FileAck::retry(&header.file_id)).await;
                }
                let info = ResumeInfo {
                    file_id: header.file_id.clone(),
                    total_chunks: chunk_count(header.size_bytes, header.chunk_size).unwrap(),
                    ranges,
                };
                channel
                    .send(&Frame::json(FrameType::ResumeInfo, &info, true).unwrap())
                    .await
                    .unwrap();

                let ids: Vec<u32> = drain_file(&mut channel)
                    .await
                    .iter()
                    .map(|f| f.header.chunk_id)
                    .collect();
                seen.push(ids);
                let ack = if attempt == 0 {
                    FileAck::retry(&header.file_id)
                } else {
                    FileAck::ok(&header.file_id)
                };
                send_ack(&mut channel, &ack).await;
            }
            let end = channel.recv(READ_TIMEOUT).await.unwrap();
            assert_eq!(end.header.frame_type, FrameType::TransferEnd);
            seen
        });

        let sender = TransferSender::new(plain_options(src.path()), CancellationToken::new());
        let summary = sender
            .connect_and_send("127.0.0.1", port, &files)
            .await
            .unwrap();

        assert_eq!(peer.await.unwrap(), vec![vec![0, 1], vec![1]]);
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.files_sent, 1);
        assert_eq!(summary.bytes_sent, 100_000 + 34_464);
        assert_eq!(summary.bytes_skipped, 65_536);
    }

    #[tokio::test]
    async fn retries_exhausted_fail_the_session() {
        let src = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "a.txt", b"helloworld")];
        let (listener, port) = loopback_listener().await;
        let _peer = tokio::spawn(retrying_peer(listener, u32::MAX));

        let options = DataOptions {
            resume_enabled: false,
            ..plain_options(src.path())
        };
        let (observer, mut events) = ChannelObserver::channel();
        let sender = TransferSender::new(options, CancellationToken::new())
            .with_observer(Arc::new(observer));
        let result = sender.connect_and_send("127.0.0.1", port, &files).await;

        match result {
            Err(DataChannelError::RetryExhausted { file_id, attempts }) => {
                assert_eq!(file_id, "id-a.txt");
                assert_eq!(attempts, MAX_ATTEMPTS);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }

        let mut failed = false;
        while let Ok(e) = events.try_recv() {
            if let TransferEvent::TransferCompleted { success, .. } = e {
                assert!(!success);
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn empty_batch_is_a_successful_session() {
        let dest = tempfile::tempdir().unwrap();
        let sender = TransferSender::new(plain_options(dest.path()), CancellationToken::new());
        let receiver = TransferReceiver::new(plain_options(dest.path()), CancellationToken::new());
        let (sent, received) = run_pair(sender, receiver, &[]).await;

        assert_eq!(sent.unwrap(), SendSummary::default());
        assert_eq!(received.unwrap(), crate::ReceiveSummary::default());
    }

    #[tokio::test]
    async fn cancelled_before_connect() {
        let src = tempfile::tempdir().unwrap();
        let files = vec![source_file(src.path(), "a.txt", b"helloworld")];
        let (_listener, port) = loopback_listener().await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let sender = TransferSender::new(plain_options(src.path()), cancel);
        let result = sender.connect_and_send("127.0.0.1", port, &files).await;
        assert!(matches!(result, Err(DataChannelError::Cancelled)));
    }

    #[tokio::test]
    async fn invalid_options_rejected_before_connecting() {
        let options = DataOptions {
            passphrase: String::new(),
            ..scenario_options(std::path::Path::new("."))
        };
        let sender = TransferSender::new(options, CancellationToken::new());
        // Port 9 is never contacted: validation fails first.
        let result = sender.connect_and_send("127.0.0.1", 9, &[]).await;
        assert!(matches!(result, Err(DataChannelError::InvalidOptions(_))));
    }
}
