//! Per-session JSON report written with `--report`.

use std::path::Path;

use chrono::{DateTime, Utc};
use saknet_data_channel::{DataChannelError, ReceiveSummary, SendSummary};
use saknet_transfer::TransferFileEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

/// One manifest line. Only the sender knows its batch up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    pub relative_path: String,
    pub size_bytes: u64,
    pub checksum_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    pub transfer_id: String,
    pub role: Role,
    /// `host:port` dialled by the sender, or the receiver's bind address.
    pub peer: String,
    pub status: ReportStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub total_bytes: u64,
    /// Plaintext bytes put on (or taken off) the wire.
    pub bytes_transferred: u64,
    /// Bytes the receiver already had from an earlier run.
    pub bytes_skipped: u64,
    pub retries: u32,
    pub errors: Vec<String>,
    pub files: Vec<ReportFile>,
}

impl TransferReport {
    pub fn new(transfer_id: &str, role: Role, peer: impl Into<String>) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            role,
            peer: peer.into(),
            status: ReportStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_files: 0,
            total_bytes: 0,
            bytes_transferred: 0,
            bytes_skipped: 0,
            retries: 0,
            errors: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn set_manifest(&mut self, files: &[TransferFileEntry]) {
        self.total_files = files.len();
        self.total_bytes = files.iter().map(|f| f.size_bytes).sum();
        self.files = files
            .iter()
            .map(|f| ReportFile {
                relative_path: f.relative_path.clone(),
                size_bytes: f.size_bytes,
                checksum_sha256: f.checksum_sha256.clone(),
            })
            .collect();
    }

    pub fn record_send(&mut self, summary: &SendSummary) {
        self.bytes_transferred = summary.bytes_sent;
        self.bytes_skipped = summary.bytes_skipped;
        self.retries = summary
            .attempts
            .saturating_sub(summary.files_sent as u32);
    }

    pub fn record_receive(&mut self, summary: &ReceiveSummary) {
        self.total_files = summary.files_received;
        self.bytes_transferred = summary.bytes_received;
        self.retries = summary.retries_requested;
    }

    /// Stamps the completion time and status from the session result.
    pub fn finish<T>(&mut self, result: &Result<T, DataChannelError>) {
        self.completed_at = Some(Utc::now());
        self.status = match result {
            Ok(_) => ReportStatus::Success,
            Err(DataChannelError::Cancelled) => ReportStatus::Cancelled,
            Err(_) => ReportStatus::Failed,
        };
        if let Err(e) = result {
            self.errors.push(e.to_string());
        }
    }

    /// Writes the report as indented JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
