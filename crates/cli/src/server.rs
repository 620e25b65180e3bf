//! `trftp-server`: pushes one file to a single client and exits.

use std::path::PathBuf;

use clap::Parser;
use trftp_core::{Device, Server, Status};

use crate::port_in_range;

/// Pushes `file` to a client listening on `127.0.0.1:<client-port>`, then exits.
#[derive(Debug, Parser)]
#[command(about, disable_version_flag = true)]
pub struct ServerArgs {
    /// File to send.
    pub file: PathBuf,

    /// Port the client is listening on, on `127.0.0.1`.
    #[arg(value_parser = port_in_range)]
    pub client_port: u16,

    /// File version to announce.
    #[arg(long, default_value_t = 0)]
    pub version: u32,

    /// Destination device id to stamp into outbound datagrams.
    #[arg(long = "device-id", default_value_t = 0)]
    pub device_id: u16,

    /// Enable verbose (`debug`) logging; overridden by `RUST_LOG` if set.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Runs one transfer and returns the process exit code: `0` on `FIN`,
/// non-zero on `NTF` (client unreachable) or `CXL` (transfer aborted).
#[must_use]
pub fn run(args: ServerArgs) -> i32 {
    if !args.file.exists() {
        eprintln!("file does not exist: {}", args.file.display());
        return 1;
    }
    if !args.file.is_file() {
        eprintln!("not a regular file: {}", args.file.display());
        return 1;
    }

    let server = match Server::new(0) {
        Ok(server) => server,
        Err(error) => {
            eprintln!("failed to start server: {error}");
            return 1;
        }
    };

    let client_uri = format!("127.0.0.1:{}", args.client_port);
    println!("Starting file transfer to {client_uri}...");

    let device = Device { id: args.device_id };
    let result = server.start_transfer(&client_uri, &args.file, args.version, device);

    match result {
        Ok(Status::Fin) => {
            println!("Successfully transferred file to {client_uri}");
            0
        }
        Ok(Status::Ntf) => {
            eprintln!("cannot find client: {client_uri}");
            1
        }
        Ok(_) => {
            eprintln!("transfer cancelled");
            1
        }
        Err(error) => {
            eprintln!("transfer failed: {error}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_client_port() {
        let result = ServerArgs::try_parse_from(["trftp-server", "file.bin", "80"]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults_version_and_device_id_to_zero() {
        let args = ServerArgs::try_parse_from(["trftp-server", "file.bin", "9000"]).unwrap();
        assert_eq!(args.version, 0);
        assert_eq!(args.device_id, 0);
        assert!(!args.verbose);
    }

    #[test]
    fn run_reports_missing_file() {
        let args = ServerArgs {
            file: PathBuf::from("/does/not/exist"),
            client_port: 9000,
            version: 0,
            device_id: 0,
            verbose: false,
        };
        assert_eq!(run(args), 1);
    }
}
