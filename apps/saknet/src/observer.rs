//! Logs transfer progress with throughput and ETA.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use saknet_transfer::{SpeedCalculator, TransferObserver};

/// Minimum spacing between progress lines.
const LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct LogObserver {
    speed: SpeedCalculator,
    state: Mutex<ProgressState>,
}

#[derive(Default)]
struct ProgressState {
    last_bytes: u64,
    last_log: Option<Instant>,
}

impl TransferObserver for LogObserver {
    fn transfer_started(&self) {
        self.speed.reset();
        tracing::info!("transfer started");
    }

    fn file_started(&self, file_id: &str, relative_path: &str, size_bytes: u64) {
        tracing::info!(file_id, path = relative_path, size = size_bytes, "file started");
    }

    fn overall_progress(&self, bytes_done: u64, total_bytes: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        self.speed
            .add_sample(bytes_done.saturating_sub(state.last_bytes));
        state.last_bytes = bytes_done;

        let now = Instant::now();
        let finished = total_bytes > 0 && bytes_done >= total_bytes;
        let recent = state
            .last_log
            .is_some_and(|last| now.duration_since(last) < LOG_INTERVAL);
        if recent && !finished {
            return;
        }
        state.last_log = Some(now);

        let rate = self.speed.bytes_per_second();
        let eta = self.speed.eta(total_bytes.saturating_sub(bytes_done));
        tracing::info!(
            done = bytes_done,
            total = total_bytes,
            percent = format_args!("{:.1}", percent(bytes_done, total_bytes)),
            rate_kib_s = format_args!("{:.1}", rate / 1024.0),
            eta_s = eta.map(|d| d.as_secs()),
            "progress"
        );
    }

    fn file_completed(&self, file_id: &str, relative_path: &str) {
        tracing::info!(file_id, path = relative_path, "file completed");
    }

    fn transfer_completed(&self, success: bool, message: &str) {
        if success {
            tracing::info!(detail = message, "transfer finished");
        } else {
            tracing::warn!(detail = message, "transfer finished with errors");
        }
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}
