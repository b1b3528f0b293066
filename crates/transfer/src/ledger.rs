//! Resume ledger: completed chunk ranges persisted next to a partial file.

use std::path::Path;
use std::time::Duration;

use saknet_protocol::ResumeInfo;
use tokio::time::Instant;
use tracing::debug;

use crate::TransferError;

/// Minimum spacing between throttled ledger writes.
pub const LEDGER_SAVE_INTERVAL: Duration = Duration::from_secs(2);

/// Sorted, disjoint, inclusive chunk-id ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkRanges(Vec<(u32, u32)>);

impl ChunkRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a normalised set from arbitrary pairs: inverted pairs are
    /// dropped, the rest sorted and coalesced.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut pairs: Vec<(u32, u32)> = pairs.into_iter().filter(|(lo, hi)| lo <= hi).collect();
        pairs.sort_unstable();

        let mut out: Vec<(u32, u32)> = Vec::with_capacity(pairs.len());
        for (lo, hi) in pairs {
            match out.last_mut() {
                Some(last) if u64::from(lo) <= u64::from(last.1) + 1 => {
                    last.1 = last.1.max(hi);
                }
                _ => out.push((lo, hi)),
            }
        }
        Self(out)
    }

    /// Inserts `id`, coalescing with touching neighbours.
    pub fn merge(&mut self, id: u32) {
        if self.contains(id) {
            return;
        }

        let mut lo = id;
        let mut hi = id;
        self.0.retain(|&(a, b)| {
            if b.checked_add(1) == Some(id) {
                lo = a;
                false
            } else if id.checked_add(1) == Some(a) {
                hi = b;
                false
            } else {
                true
            }
        });

        let pos = self.0.partition_point(|&(a, _)| a < lo);
        self.0.insert(pos, (lo, hi));
    }

    pub fn contains(&self, id: u32) -> bool {
        let idx = self.0.partition_point(|&(_, hi)| hi < id);
        self.0.get(idx).is_some_and(|&(lo, _)| lo <= id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest covered id, if any.
    pub fn max(&self) -> Option<u32> {
        self.0.last().map(|&(_, hi)| hi)
    }

    pub fn as_slice(&self) -> &[(u32, u32)] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<(u32, u32)> {
        self.0.clone()
    }
}

/// The receiver's per-file record of completed chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeLedger {
    pub file_id: String,
    pub total_chunks: u32,
    pub ranges: ChunkRanges,
}

impl ResumeLedger {
    pub fn new(file_id: impl Into<String>, total_chunks: u32) -> Self {
        Self {
            file_id: file_id.into(),
            total_chunks,
            ranges: ChunkRanges::new(),
        }
    }

    /// Loads the ledger at `path` for the given file.
    ///
    /// A missing or unparseable file, or one describing a different file
    /// (`file_id`, `total_chunks` or out-of-range ids), yields an empty
    /// ledger.
    pub async fn load(path: &Path, file_id: &str, total_chunks: u32) -> Self {
        let empty = Self::new(file_id, total_chunks);

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(_) => return empty,
        };
        let info: ResumeInfo = match serde_json::from_slice(&bytes) {
            Ok(i) => i,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding unreadable ledger");
                return empty;
            }
        };
        if info.file_id != file_id || info.total_chunks != total_chunks {
            debug!(path = %path.display(), "discarding ledger for a different file");
            return empty;
        }

        let ranges = ChunkRanges::from_pairs(info.ranges);
        if ranges.max().is_some_and(|hi| hi >= total_chunks) {
            debug!(path = %path.display(), "discarding ledger with out-of-range chunks");
            return empty;
        }

        Self {
            file_id: info.file_id,
            total_chunks,
            ranges,
        }
    }

    /// Seeds a ledger from an existing partial file of `partial_len` bytes
    /// when no ledger was found: chunks `[0, floor(len / chunk) - 1]`.
    pub fn from_partial_len(
        file_id: impl Into<String>,
        total_chunks: u32,
        partial_len: u64,
        chunk_size: u32,
    ) -> Self {
        let mut ledger = Self::new(file_id, total_chunks);
        if chunk_size == 0 {
            return ledger;
        }
        let complete = (partial_len / u64::from(chunk_size)).min(u64::from(total_chunks)) as u32;
        if complete > 0 {
            ledger.ranges = ChunkRanges::from_pairs([(0, complete - 1)]);
        }
        ledger
    }

    pub fn merge(&mut self, chunk_id: u32) {
        self.ranges.merge(chunk_id);
    }

    /// Bytes of a `size_bytes` file covered by the recorded chunks.
    pub fn covered_bytes(&self, chunk_size: u32, size_bytes: u64) -> u64 {
        let chunk = u64::from(chunk_size);
        self.ranges
            .as_slice()
            .iter()
            .map(|&(lo, hi)| {
                let start = (u64::from(lo) * chunk).min(size_bytes);
                let end = ((u64::from(hi) + 1) * chunk).min(size_bytes);
                end - start
            })
            .sum()
    }

    pub fn to_resume_info(&self) -> ResumeInfo {
        ResumeInfo {
            file_id: self.file_id.clone(),
            total_chunks: self.total_chunks,
            ranges: self.ranges.to_vec(),
        }
    }

    /// Writes the ledger as compact JSON.
    pub async fn save(&self, path: &Path) -> Result<(), TransferError> {
        let json = serde_json::to_vec(&self.to_resume_info())?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), ranges = ?self.ranges.as_slice(), "ledger saved");
        Ok(())
    }

    /// Removes the ledger file; a missing file is not an error.
    pub async fn remove(path: &Path) -> Result<(), TransferError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Rate limiter for ledger writes.
pub struct SaveThrottle {
    interval: Duration,
    last: Instant,
}

impl SaveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Returns `true` and restarts the interval when a save is due.
    pub fn ready(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

impl Default for SaveThrottle {
    fn default() -> Self {
        Self::new(LEDGER_SAVE_INTERVAL)
    }
}
