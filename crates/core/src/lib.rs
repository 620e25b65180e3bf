//! TRFTP server and client transaction state machines.
//!
//! # Overview
//!
//! [`server::Server`] pushes one file at a time to a known client address,
//! running the `NTF -> CHK -> INFO -> RDY -> DATA -> DONE -> FIN` sequence
//! described in spec.md §4.3. [`client::Client`] is the mirror image: it
//! listens for an unsolicited `NTF`, stages the incoming file, verifies it,
//! and hands it to an attached callback (spec.md §4.4).
//!
//! # Design
//!
//! Both sides are built on [`endpoint::UdpEndpoint`] and `protocol`'s
//! framing/validation layer; neither type here touches raw bytes directly.
//! A background dispatcher thread owns the socket's receive loop for the
//! lifetime of the `Server`/`Client` value and is joined on `Drop`.
//!
//! # Errors
//!
//! [`TransferError`] covers the configuration-class failures the public API
//! reports synchronously. Protocol-level and local I/O failures during a
//! transaction resolve to the transaction reaching `Status::Cxl` instead of
//! propagating as a `Result` error.

mod client;
mod config;
mod dispatch;
mod error;
mod fs_crc;
mod server;
mod status;

pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder};
pub use error::TransferError;
pub use server::{Device, Server};
pub use status::Status;
