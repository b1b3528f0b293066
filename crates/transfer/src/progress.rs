use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Progress and lifecycle notifications emitted by a running transfer.
///
/// All methods default to no-ops so hosts only implement what they need.
/// Implementations must not block; they are called from the transfer task.
pub trait TransferObserver: Send + Sync {
    fn transfer_started(&self) {}

    fn file_started(&self, _file_id: &str, _relative_path: &str, _size_bytes: u64) {}

    fn file_progress(&self, _file_id: &str, _bytes_done: u64, _total_bytes: u64) {}

    fn overall_progress(&self, _bytes_done: u64, _total_bytes: u64) {}

    fn file_completed(&self, _file_id: &str, _relative_path: &str) {}

    fn transfer_completed(&self, _success: bool, _message: &str) {}

    fn error_occurred(&self, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Owned form of every observer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    TransferStarted,
    FileStarted {
        file_id: String,
        relative_path: String,
        size_bytes: u64,
    },
    FileProgress {
        file_id: String,
        bytes_done: u64,
        total_bytes: u64,
    },
    OverallProgress {
        bytes_done: u64,
        total_bytes: u64,
    },
    FileCompleted {
        file_id: String,
        relative_path: String,
    },
    TransferCompleted {
        success: bool,
        message: String,
    },
    ErrorOccurred {
        message: String,
    },
}

/// Forwards events into an unbounded channel.
///
/// Sends after the receiver is dropped are silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<TransferEvent>) -> Self {
        Self { tx }
    }

    /// Creates an observer together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }
}

impl TransferObserver for ChannelObserver {
    fn transfer_started(&self) {
        self.emit(TransferEvent::TransferStarted);
    }

    fn file_started(&self, file_id: &str, relative_path: &str, size_bytes: u64) {
        self.emit(TransferEvent::FileStarted {
            file_id: file_id.to_string(),
            relative_path: relative_path.to_string(),
            size_bytes,
        });
    }

    fn file_progress(&self, file_id: &str, bytes_done: u64, total_bytes: u64) {
        self.emit(TransferEvent::FileProgress {
            file_id: file_id.to_string(),
            bytes_done,
            total_bytes,
        });
    }

    fn overall_progress(&self, bytes_done: u64, total_bytes: u64) {
        self.emit(TransferEvent::OverallProgress {
            bytes_done,
            total_bytes,
        });
    }

    fn file_completed(&self, file_id: &str, relative_path: &str) {
        self.emit(TransferEvent::FileCompleted {
            file_id: file_id.to_string(),
            relative_path: relative_path.to_string(),
        });
    }

    fn transfer_completed(&self, success: bool, message: &str) {
        self.emit(TransferEvent::TransferCompleted {
            success,
            message: message.to_string(),
        });
    }

    fn error_occurred(&self, message: &str) {
        self.emit(TransferEvent::ErrorOccurred {
            message: message.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let Ok(mut s) = self.inner.lock() else {
            return;
        };
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window, 0.0 with fewer
    /// than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let Ok(s) = self.inner.lock() else {
            return 0.0;
        };
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }

    pub fn reset(&self) {
        if let Ok(mut s) = self.inner.lock() {
            s.samples.clear();
        }
    }
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}
