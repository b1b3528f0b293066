//! Token-bucket-like send pacing with a live-tunable limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Length of one pacing window.
const WINDOW: Duration = Duration::from_millis(1000);

/// Shared, atomically updatable bandwidth limit in KiB/s (0 = unlimited).
///
/// Clones share the same value, so a host can re-tune a running sender.
#[derive(Debug, Clone, Default)]
pub struct BandwidthLimit(Arc<AtomicU32>);

impl BandwidthLimit {
    pub fn new(kbps: u32) -> Self {
        Self(Arc::new(AtomicU32::new(kbps)))
    }

    pub fn kbps(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_kbps(&self, kbps: u32) {
        self.0.store(kbps, Ordering::Relaxed);
    }
}

/// Delay owed after sending `window_bytes` within `elapsed` at `kbps`.
///
/// `expected_ms = window_bytes * 1000 / (kbps * 1024)`; returns the
/// positive difference to `elapsed`, or `None` when on schedule or
/// unlimited.
pub fn pacing_delay(window_bytes: u64, kbps: u32, elapsed: Duration) -> Option<Duration> {
    if kbps == 0 {
        return None;
    }
    let expected_ms = window_bytes.saturating_mul(1000) / (u64::from(kbps) * 1024);
    let elapsed_ms = elapsed.as_millis() as u64;
    (expected_ms > elapsed_ms).then(|| Duration::from_millis(expected_ms - elapsed_ms))
}

/// Tracks bytes sent in the current window and reports how long to sleep.
pub struct BandwidthRegulator {
    limit: BandwidthLimit,
    window_start: Instant,
    window_bytes: u64,
}

impl BandwidthRegulator {
    pub fn new(limit: BandwidthLimit) -> Self {
        Self {
            limit,
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    pub fn limit(&self) -> &BandwidthLimit {
        &self.limit
    }

    /// Records `bytes` of plaintext sent and returns the sleep owed.
    ///
    /// The limit is re-read on every call. Once a window has run for a
    /// second it restarts, after any owed delay.
    pub fn record(&mut self, bytes: u64) -> Option<Duration> {
        let kbps = self.limit.kbps();
        if kbps == 0 {
            self.window_start = Instant::now();
            self.window_bytes = 0;
            return None;
        }

        self.window_bytes += bytes;
        let elapsed = self.window_start.elapsed();
        let delay = pacing_delay(self.window_bytes, kbps, elapsed);

        if elapsed >= WINDOW {
            self.window_start = Instant::now() + delay.unwrap_or_default();
            self.window_bytes = 0;
        }
        delay
    }
}
