//! Receiver side: accepts one connection and writes incoming files under
//! the destination base.

use std::path::PathBuf;
use std::sync::Arc;

use saknet_protocol::{FileAck, FileHeaderPayload, Frame, FrameType};
use saknet_transfer::{
    NoopObserver, PartialFile, ResumeLedger, SaveThrottle, TransferObserver, apply_permissions,
    calculate_file_checksum, chunk_count, finalize_partial, ledger_path_for, partial_path_for,
    resolve_destination, resolve_permission_action,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::FrameChannel;
use crate::error::DataChannelError;
use crate::options::{DataOptions, validate_chunk_size};
use crate::pipeline::ChunkCodec;
use crate::{ACCEPT_TIMEOUT, READ_TIMEOUT, report_outcome};

/// What a completed receive did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub files_received: usize,
    /// Size of every finalised file.
    pub bytes_received: u64,
    /// `retry` acks sent after checksum or rename failures.
    pub retries_requested: u32,
}

/// TCP receiver for one transfer session.
pub struct TransferReceiver {
    options: DataOptions,
    cancel: CancellationToken,
    observer: Arc<dyn TransferObserver>,
}

impl TransferReceiver {
    pub fn new(options: DataOptions, cancel: CancellationToken) -> Self {
        Self {
            options,
            cancel,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Binds the listener. Port 0 picks an ephemeral port; read it back
    /// with `local_addr()`.
    pub async fn listen(&self, host: &str, port: u16) -> Result<TcpListener, DataChannelError> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| DataChannelError::ConnectionFailed(format!("bind {host}:{port}: {e}")))?;
        info!(addr = %listener.local_addr()?, "data channel listening");
        Ok(listener)
    }

    /// Binds, accepts a single connection and receives until `TransferEnd`.
    pub async fn receive(&self, host: &str, port: u16) -> Result<ReceiveSummary, DataChannelError> {
        self.observer.transfer_started();
        let result = match self.listen(host, port).await {
            Ok(listener) => self.run(listener).await,
            Err(e) => Err(e),
        };
        report_outcome(self.observer.as_ref(), &result, "all files received");
        result
    }

    /// Accepts a single connection on `listener` and receives files.
    ///
    /// Emits `transfer_started` immediately and exactly one
    /// `transfer_completed` at the end.
    pub async fn accept_and_receive(
        &self,
        listener: TcpListener,
    ) -> Result<ReceiveSummary, DataChannelError> {
        self.observer.transfer_started();
        let result = self.run(listener).await;
        report_outcome(self.observer.as_ref(), &result, "all files received");
        result
    }

    async fn run(&self, listener: TcpListener) -> Result<ReceiveSummary, DataChannelError> {
        self.options.validate()?;
        let codec = ChunkCodec::from_options(&self.options).await?;

        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()) => {
                match result {
                    Ok(Ok((stream, addr))) => {
                        info!(%addr, "data channel connection accepted");
                        stream
                    }
                    Ok(Err(e)) => return Err(DataChannelError::ConnectionFailed(format!("accept: {e}"))),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };

        // One connection per session.
        drop(listener);
        stream.set_nodelay(true)?;

        let mut channel =
            FrameChannel::from_tcp(stream, self.cancel.clone(), self.options.max_frame_payload);
        let mut session = Session {
            options: &self.options,
            observer: self.observer.as_ref(),
            codec,
            current: None,
            summary: ReceiveSummary::default(),
            completed_bytes: 0,
        };

        let result = session.run(&mut channel).await;
        if result.is_err() {
            session.flush_interrupted().await;
        }
        result
    }
}

/// Receiver state for the file currently being written.
struct IncomingFile {
    header: FileHeaderPayload,
    final_path: PathBuf,
    ledger_path: PathBuf,
    partial: PartialFile,
    ledger: ResumeLedger,
    throttle: SaveThrottle,
    bytes_done: u64,
}

struct Session<'a> {
    options: &'a DataOptions,
    observer: &'a dyn TransferObserver,
    codec: ChunkCodec,
    current: Option<IncomingFile>,
    summary: ReceiveSummary,
    completed_bytes: u64,
}

impl Session<'_> {
    async fn run<R, W>(
        &mut self,
        channel: &mut FrameChannel<R, W>,
    ) -> Result<ReceiveSummary, DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let frame = channel.recv(READ_TIMEOUT).await?;
            match frame.header.frame_type {
                FrameType::FileHeader => self.on_file_header(channel, &frame).await?,
                FrameType::DataChunk => self.on_data_chunk(&frame).await?,
                FrameType::FileEnd => self.on_file_end(channel).await?,
                FrameType::TransferEnd => {
                    if let Some(file) = &self.current {
                        return Err(DataChannelError::Protocol(format!(
                            "TransferEnd while {} is still open",
                            file.header.relative_path
                        )));
                    }
                    info!(
                        files = self.summary.files_received,
                        bytes = self.summary.bytes_received,
                        "transfer complete"
                    );
                    return Ok(self.summary.clone());
                }
                other => {
                    return Err(DataChannelError::Protocol(format!(
                        "unexpected {other:?} frame from sender"
                    )));
                }
            }
        }
    }

    async fn on_file_header<R, W>(
        &mut self,
        channel: &mut FrameChannel<R, W>,
        frame: &Frame,
    ) -> Result<(), DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if let Some(file) = &self.current {
            return Err(DataChannelError::Protocol(format!(
                "FileHeader while {} is still open",
                file.header.relative_path
            )));
        }

        let header: FileHeaderPayload = frame.parse_json()?;
        validate_chunk_size(header.chunk_size).map_err(|_| {
            DataChannelError::Protocol(format!(
                "FileHeader chunk_size {} out of range",
                header.chunk_size
            ))
        })?;

        let final_path = resolve_destination(&self.options.destination_base, &header.relative_path)
            .inspect_err(|e| error!(path = %header.relative_path, error = %e, "rejecting file"))?;
        let ledger_path = ledger_path_for(&final_path);
        let total_chunks = chunk_count(header.size_bytes, header.chunk_size)?;
        let resume = self.options.resume_enabled;

        let ledger = if resume {
            self.load_ledger(&header, &final_path, &ledger_path, total_chunks)
                .await
        } else {
            ResumeLedger::new(header.file_id.clone(), total_chunks)
        };

        let partial = PartialFile::open(&final_path, header.chunk_size, resume).await?;

        if resume {
            channel
                .send(&Frame::json(
                    FrameType::ResumeInfo,
                    &ledger.to_resume_info(),
                    true,
                )?)
                .await?;
        }

        let bytes_done = ledger.covered_bytes(header.chunk_size, header.size_bytes);
        info!(
            file_id = %header.file_id,
            path = %header.relative_path,
            size = header.size_bytes,
            chunks = total_chunks,
            resumed_bytes = bytes_done,
            "receiving file"
        );
        self.observer
            .file_started(&header.file_id, &header.relative_path, header.size_bytes);

        self.current = Some(IncomingFile {
            header,
            final_path,
            ledger_path,
            partial,
            ledger,
            throttle: SaveThrottle::default(),
            bytes_done,
        });
        Ok(())
    }

    /// Loads the ledger for a file, falling back to the partial file's
    /// length when no ledger exists.
    async fn load_ledger(
        &self,
        header: &FileHeaderPayload,
        final_path: &std::path::Path,
        ledger_path: &std::path::Path,
        total_chunks: u32,
    ) -> ResumeLedger {
        if tokio::fs::try_exists(ledger_path).await.unwrap_or(false) {
            return ResumeLedger::load(ledger_path, &header.file_id, total_chunks).await;
        }
        match tokio::fs::metadata(partial_path_for(final_path)).await {
            Ok(meta) => {
                debug!(path = %header.relative_path, len = meta.len(), "seeding ledger from partial file");
                ResumeLedger::from_partial_len(
                    header.file_id.clone(),
                    total_chunks,
                    meta.len(),
                    header.chunk_size,
                )
            }
            Err(_) => ResumeLedger::new(header.file_id.clone(), total_chunks),
        }
    }

    async fn on_data_chunk(&mut self, frame: &Frame) -> Result<(), DataChannelError> {
        let Some(file) = self.current.as_mut() else {
            return Err(DataChannelError::Protocol("DataChunk before FileHeader".into()));
        };

        let h = &frame.header;
        let total_chunks = file.ledger.total_chunks;
        if h.plain_size == 0 || h.plain_size > file.header.chunk_size || h.chunk_id >= total_chunks {
            return Err(DataChannelError::Protocol(format!(
                "chunk {} of {} bytes does not fit {total_chunks} chunks of {}",
                h.chunk_id, h.plain_size, file.header.chunk_size
            )));
        }

        let data = self.codec.open(frame)?;
        file.partial.write_chunk(h.chunk_id, &data).await?;

        if !file.ledger.ranges.contains(h.chunk_id) {
            file.bytes_done += data.len() as u64;
            file.ledger.merge(h.chunk_id);
        }
        debug!(
            file_id = %file.header.file_id,
            chunk_id = h.chunk_id,
            plain_size = h.plain_size,
            "chunk written"
        );

        if self.options.resume_enabled && file.throttle.ready() {
            file.partial.flush().await?;
            if let Err(e) = file.ledger.save(&file.ledger_path).await {
                warn!(path = %file.ledger_path.display(), error = %e, "ledger save failed");
            }
        }

        self.observer
            .file_progress(&file.header.file_id, file.bytes_done, file.header.size_bytes);
        self.observer
            .overall_progress(self.completed_bytes + file.bytes_done, self.options.total_bytes);
        Ok(())
    }

    async fn on_file_end<R, W>(
        &mut self,
        channel: &mut FrameChannel<R, W>,
    ) -> Result<(), DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(file) = self.current.take() else {
            return Err(DataChannelError::Protocol("FileEnd before FileHeader".into()));
        };
        let IncomingFile {
            header,
            final_path,
            ledger_path,
            partial,
            ledger,
            ..
        } = file;

        if self.options.resume_enabled {
            if let Err(e) = ledger.save(&ledger_path).await {
                warn!(path = %ledger_path.display(), error = %e, "ledger save failed");
            }
        }

        let partial_path = partial.close(header.size_bytes).await?;
        let checksum_path = partial_path.clone();
        let actual = tokio::task::spawn_blocking(move || calculate_file_checksum(&checksum_path))
            .await
            .map_err(|e| std::io::Error::other(format!("checksum task failed: {e}")))??;

        if !actual.eq_ignore_ascii_case(&header.checksum_sha256) {
            let mismatch = DataChannelError::ChecksumMismatch {
                expected: header.checksum_sha256.clone(),
                actual,
            };
            warn!(file_id = %header.file_id, path = %header.relative_path, error = %mismatch, "requesting retry");
            remove_quietly(&partial_path).await;
            if let Err(e) = ResumeLedger::remove(&ledger_path).await {
                warn!(path = %ledger_path.display(), error = %e, "ledger removal failed");
            }
            self.summary.retries_requested += 1;
            return self.send_ack(channel, FileAck::retry(&header.file_id)).await;
        }

        if let Err(e) = finalize_partial(&partial_path, &final_path).await {
            warn!(path = %final_path.display(), error = %e, "rename failed; requesting retry");
            self.summary.retries_requested += 1;
            return self.send_ack(channel, FileAck::retry(&header.file_id)).await;
        }

        let action = resolve_permission_action(
            header.acl_sddl.as_deref(),
            &header.relative_path,
            &self.options.acl_overrides,
            &self.options.permission_modes,
        );
        if let Err(e) = apply_permissions(&final_path, &action).await {
            warn!(path = %final_path.display(), error = %e, "could not apply permissions");
        }

        if let Err(e) = ResumeLedger::remove(&ledger_path).await {
            warn!(path = %ledger_path.display(), error = %e, "ledger removal failed");
        }

        info!(file_id = %header.file_id, path = %final_path.display(), "file received");
        self.send_ack(channel, FileAck::ok(&header.file_id)).await?;

        self.summary.files_received += 1;
        self.summary.bytes_received += header.size_bytes;
        self.completed_bytes += header.size_bytes;
        self.observer
            .file_completed(&header.file_id, &header.relative_path);
        Ok(())
    }

    async fn send_ack<R, W>(
        &self,
        channel: &mut FrameChannel<R, W>,
        ack: FileAck,
    ) -> Result<(), DataChannelError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        channel
            .send(&Frame::json(FrameType::FileAck, &ack, false)?)
            .await
    }

    /// Persists the ledger of a file left open by an aborted session; the
    /// `.partial` stays where it is.
    async fn flush_interrupted(&mut self) {
        let Some(mut file) = self.current.take() else {
            return;
        };
        if let Err(e) = file.partial.flush().await {
            warn!(path = %file.partial.path().display(), error = %e, "partial flush failed");
        }
        if !self.options.resume_enabled {
            return;
        }
        match file.ledger.save(&file.ledger_path).await {
            Ok(()) => info!(
                path = %file.header.relative_path,
                ranges = ?file.ledger.ranges.as_slice(),
                "saved resume point for interrupted file"
            ),
            Err(e) => warn!(path = %file.ledger_path.display(), error = %e, "ledger save failed"),
        }
    }
}

async fn remove_quietly(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove file"),
    }
}
