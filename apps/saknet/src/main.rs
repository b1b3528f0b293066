//! saknet command-line entry point.

mod app;
mod config;
mod entries;
mod observer;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Encrypted, resumable file transfer over TCP.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v for debug, -vv for trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Session identifier; overrides the config file.
    #[arg(long, global = true)]
    pub transfer_id: Option<String>,

    /// Write a JSON report of the session to this path.
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send files and directories to a listening receiver.
    Send {
        /// Receiver host name or address.
        host: String,

        /// Receiver port.
        port: u16,

        /// Files or directories to send.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Bandwidth cap in KiB/s (0 = unlimited).
        #[arg(long)]
        max_kbps: Option<u32>,
    },

    /// Accept one sender and write its files under the destination.
    Receive {
        /// Port to listen on (0 = auto-assign).
        #[arg(short, long, default_value_t = 0)]
        port: u16,

        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Destination directory; overrides the config file.
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Expected batch size in bytes, for overall progress.
        #[arg(long, default_value_t = 0)]
        expect_bytes: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting saknet");

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(transfer_id) = &cli.transfer_id {
        config.transfer_id = transfer_id.clone();
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli.command, config, cli.report.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_arguments_parse() {
        let cli = Cli::parse_from([
            "saknet", "-v", "send", "10.0.0.2", "47000", "a.txt", "assets", "--max-kbps", "512",
            "--report", "out/run.json",
        ]);
        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.report, Some(PathBuf::from("out/run.json")));
        match cli.command {
            Command::Send {
                host,
                port,
                paths,
                max_kbps,
            } => {
                assert_eq!(host, "10.0.0.2");
                assert_eq!(port, 47000);
                assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("assets")]);
                assert_eq!(max_kbps, Some(512));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn receive_defaults() {
        let cli = Cli::parse_from(["saknet", "receive"]);
        assert!(cli.report.is_none());
        match cli.command {
            Command::Receive {
                port,
                bind,
                dest,
                expect_bytes,
            } => {
                assert_eq!(port, 0);
                assert_eq!(bind, "0.0.0.0");
                assert!(dest.is_none());
                assert_eq!(expect_bytes, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
