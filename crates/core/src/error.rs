//! Configuration-class errors the public API reports synchronously
//! (spec.md §7, "Configuration").

use std::net::AddrParseError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors [`crate::server::Server::start_transfer`] and
/// [`crate::server::Server::abort`] can return.
///
/// These are the only failures that surface as a `Result` from the public
/// API; every protocol-level or local-I/O failure during a transaction
/// instead resolves to the transaction reaching `Status::Cxl`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// `client_uri` was not a parseable `IPv4:port` address.
    #[error("invalid client address '{uri}': {source}")]
    InvalidClientUri {
        /// The URI string that failed to parse.
        uri: String,
        /// The underlying parse failure.
        #[source]
        source: AddrParseError,
    },

    /// The file to transfer does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// A transaction is already active for the peer's IP address.
    #[error("transaction already exists for {0}")]
    DuplicateTransaction(std::net::Ipv4Addr),

    /// `abort` was called for a peer with no active transaction.
    #[error("no active transaction for {0}")]
    UnknownPeer(std::net::Ipv4Addr),

    /// The file's metadata (size) could not be read.
    #[error("failed to read metadata for {path}: {source}")]
    FileMetadata {
        /// Path whose metadata could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The endpoint could not be bound or configured.
    #[error(transparent)]
    Endpoint(#[from] endpoint::EndpointError),
}
