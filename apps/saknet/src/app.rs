//! Runs one send or receive session.

use std::path::Path;
use std::sync::Arc;

use saknet_data_channel::{TransferReceiver, TransferSender};
use tokio_util::sync::CancellationToken;

use crate::Command;
use crate::config::Config;
use crate::entries::collect_entries;
use crate::observer::LogObserver;
use crate::report::{Role, TransferReport};

pub async fn run(
    command: Command,
    config: Config,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut options = config.to_options()?;
    let observer = Arc::new(LogObserver::default());

    match command {
        Command::Send {
            host,
            port,
            paths,
            max_kbps,
        } => {
            if let Some(kbps) = max_kbps {
                options.max_bandwidth_kbps = kbps;
            }

            let files = collect_entries(paths).await?;
            let total: u64 = files.iter().map(|f| f.size_bytes).sum();
            tracing::info!(files = files.len(), bytes = total, "batch ready");

            let peer = format!("{host}:{port}");
            let mut report = TransferReport::new(&options.transfer_id, Role::Send, peer);
            report.set_manifest(&files);

            let sender = TransferSender::new(options, cancel).with_observer(observer);
            let result = sender.connect_and_send(&host, port, &files).await;
            if let Ok(summary) = &result {
                report.record_send(summary);
            }
            report.finish(&result);
            write_report(report_path, &report).await;

            let summary = result?;
            tracing::info!(
                files = summary.files_sent,
                sent = summary.bytes_sent,
                skipped = summary.bytes_skipped,
                attempts = summary.attempts,
                "send finished"
            );
        }
        Command::Receive {
            port,
            bind,
            dest,
            expect_bytes,
        } => {
            if let Some(dest) = dest {
                options.destination_base = dest;
            }
            options.total_bytes = expect_bytes;
            tokio::fs::create_dir_all(&options.destination_base).await?;
            tracing::info!(dest = %options.destination_base.display(), "receiving into");

            let peer = format!("{bind}:{port}");
            let mut report = TransferReport::new(&options.transfer_id, Role::Receive, peer);
            let receiver = TransferReceiver::new(options, cancel).with_observer(observer);
            let listener = receiver.listen(&bind, port).await?;
            if let Ok(addr) = listener.local_addr() {
                report.peer = addr.to_string();
            }

            let result = receiver.accept_and_receive(listener).await;
            if let Ok(summary) = &result {
                report.record_receive(summary);
            }
            report.finish(&result);
            write_report(report_path, &report).await;

            let summary = result?;
            tracing::info!(
                files = summary.files_received,
                bytes = summary.bytes_received,
                retries = summary.retries_requested,
                "receive finished"
            );
        }
    }

    Ok(())
}

/// Saves the session report when one was requested. A failed write is
/// logged and does not change the exit status.
async fn write_report(path: Option<&Path>, report: &TransferReport) {
    let Some(path) = path else {
        return;
    };
    match report.save(path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), status = ?report.status, "transfer report saved")
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot save transfer report")
        }
    }
}

/// Cancels `cancel` on Ctrl-C. Partial files and ledgers stay on disk.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("SIGINT received, stopping transfer"),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                        return;
                    }
                }
                cancel.cancel();
            }
        }
    });
}
