//! `trftp-client`: waits for one incoming file, then exits.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use trftp_core::Client;

use crate::port_in_range;

/// Waits for a single incoming file transfer, writes it to `--output`, and exits.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct ClientArgs {
    /// Port to listen on.
    #[arg(value_parser = port_in_range)]
    pub port: u16,

    /// File version this client currently holds.
    #[arg(long = "current-version", default_value_t = 0)]
    pub current_version: u32,

    /// Destination path for the received file.
    #[arg(long, default_value = "./trftp_file")]
    pub output: PathBuf,

    /// Seconds to wait for a transfer before giving up.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Enable verbose (`debug`) logging; overridden by `RUST_LOG` if set.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Waits for one transfer and returns the process exit code: `0` once the
/// file is written to `--output`, non-zero if `--timeout` elapses first.
#[must_use]
pub fn run(args: ClientArgs) -> i32 {
    let client = match Client::new(args.port, args.current_version) {
        Ok(client) => client,
        Err(error) => {
            eprintln!("failed to start client: {error}");
            return 1;
        }
    };

    println!("Waiting for file transfer...");

    let (tx, rx) = mpsc::channel();
    let output = args.output.clone();
    client.attach_handler(move |staging_path, version| {
        let result = std::fs::rename(staging_path, &output)
            .map(|()| (output.clone(), version))
            .map_err(|error| error.to_string());
        let _ = tx.send(result);
    });

    match rx.recv_timeout(Duration::from_secs(args.timeout)) {
        Ok(Ok((path, version))) => {
            println!("File received: {} (version: {version})", path.display());
            0
        }
        Ok(Err(error)) => {
            eprintln!("failed to save received file: {error}");
            1
        }
        Err(mpsc::RecvTimeoutError::Timeout | mpsc::RecvTimeoutError::Disconnected) => {
            eprintln!("Timeout");
            1
        }
    }
}
