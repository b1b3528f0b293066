use std::ffi::OsString;
use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::TransferError;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the lowercase hex digest.
///
/// Blocking; async callers should run it on `spawn_blocking`.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Number of chunks a file of `size` bytes splits into.
///
/// Chunk ids are `u32`; a size needing more ids than that is an error.
pub fn chunk_count(size: u64, chunk_size: u32) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Ok(0);
    }
    u32::try_from(size.div_ceil(u64::from(chunk_size)))
        .map_err(|_| TransferError::TooManyChunks { size, chunk_size })
}

/// `<final>.partial`
pub fn partial_path_for(final_path: &Path) -> PathBuf {
    with_suffix(final_path, ".partial")
}

/// `<final>.resume.json`
pub fn ledger_path_for(final_path: &Path) -> PathBuf {
    with_suffix(final_path, ".resume.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Replaces `final_path` with `partial_path`.
///
/// Any pre-existing final file is removed first so the rename also
/// succeeds on platforms where rename does not overwrite.
pub async fn finalize_partial(partial_path: &Path, final_path: &Path) -> Result<(), TransferError> {
    match tokio::fs::remove_file(final_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::rename(partial_path, final_path).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a source file in fixed-size chunks from offset 0.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: u32,
    next_id: u32,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading of `file_size` bytes.
    pub async fn open(path: &Path, file_size: u64, chunk_size: u32) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "chunk size must be non-zero",
            )));
        }
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            file,
            chunk_size,
            next_id: 0,
            offset: 0,
            file_size,
        })
    }

    fn next_len(&self) -> u64 {
        (self.file_size - self.offset).min(u64::from(self.chunk_size))
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let len = self.next_len();
        if len == 0 {
            return Ok(None);
        }

        let mut data = vec![0u8; len as usize];
        self.file.read_exact(&mut data).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "source ended at {} bytes, expected {}",
                        self.offset, self.file_size
                    ),
                )
            } else {
                e
            }
        })?;

        let chunk = Chunk {
            id: self.next_id,
            offset: self.offset,
            is_last: self.offset + len == self.file_size,
            data,
        };
        self.offset += len;
        self.next_id += 1;
        Ok(Some(chunk))
    }

    /// Skips the next chunk without reading it. Returns its length, or
    /// `None` at EOF.
    pub async fn skip_chunk(&mut self) -> Result<Option<u64>, TransferError> {
        let len = self.next_len();
        if len == 0 {
            return Ok(None);
        }
        self.offset += len;
        self.next_id += 1;
        self.file.seek(SeekFrom::Start(self.offset)).await?;
        Ok(Some(len))
    }

    /// Id of the chunk the next call returns.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }
}

// ---------------------------------------------------------------------------
// PartialFile
// ---------------------------------------------------------------------------

/// The receiver's `<final>.partial` container.
///
/// Kept open read/write across all chunks of a file so out-of-order
/// writes land at `chunk_id * chunk_size`.
pub struct PartialFile {
    file: tokio::fs::File,
    path: PathBuf,
    chunk_size: u32,
}

impl PartialFile {
    /// Opens (creating if needed) the partial file for `final_path`.
    ///
    /// With `keep_existing` the current contents are preserved for resume;
    /// otherwise the file is truncated.
    pub async fn open(
        final_path: &Path,
        chunk_size: u32,
        keep_existing: bool,
    ) -> Result<Self, TransferError> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = partial_path_for(final_path);
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!keep_existing)
            .open(&path)
            .await?;
        Ok(Self {
            file,
            path,
            chunk_size,
        })
    }

    /// Writes a chunk at its slot offset.
    pub async fn write_chunk(&mut self, chunk_id: u32, data: &[u8]) -> Result<(), TransferError> {
        let offset = u64::from(chunk_id) * u64::from(self.chunk_size);
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        Ok(())
    }

    /// Flushes buffered writes so the file on disk is current.
    pub async fn flush(&mut self) -> Result<(), TransferError> {
        self.file.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes, trims anything past `size_bytes` and closes the file.
    pub async fn close(mut self, size_bytes: u64) -> Result<PathBuf, TransferError> {
        self.file.flush().await?;
        if self.file.metadata().await?.len() > size_bytes {
            self.file.set_len(size_bytes).await?;
        }
        self.file.sync_all().await?;
        Ok(self.path)
    }
}
