//! The TRFTP server: owns one UDP endpoint and a map of active outbound
//! transactions, one per peer IP (spec.md §2, §4.3, §6).

mod transaction;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use endpoint::UdpEndpoint;
use protocol::Kind;

use crate::config::ServerConfig;
use crate::dispatch::{receive_frame, SendDatagram};
use crate::error::TransferError;
use crate::status::Status;
use transaction::ServerTransaction;

type ActiveTransactions = Arc<Mutex<HashMap<Ipv4Addr, Arc<ServerTransaction>>>>;

/// Identifies the destination device on a transfer (spec.md §6, `Device`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Device {
    /// The `dpid` value stamped into every outbound datagram.
    pub id: u16,
}

/// A long-lived TRFTP server process.
///
/// Binds one UDP endpoint on construction and runs a background dispatcher
/// thread for the rest of its lifetime; dropping the server stops that
/// thread.
pub struct Server {
    endpoint: Arc<UdpEndpoint>,
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
    active: ActiveTransactions,
    config: ServerConfig,
}

impl Server {
    /// Binds a server on `port` (or an ephemeral port if `port == 0`) with
    /// the default [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Endpoint`] if the socket cannot be bound.
    pub fn new(port: u16) -> Result<Server, TransferError> {
        Self::with_config(port, ServerConfig::default())
    }

    /// Like [`Server::new`], with an explicit [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Endpoint`] if the socket cannot be bound.
    pub fn with_config(port: u16, config: ServerConfig) -> Result<Server, TransferError> {
        let endpoint = Arc::new(UdpEndpoint::bind(port)?);
        let active: ActiveTransactions = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let dispatcher = {
            let endpoint = Arc::clone(&endpoint);
            let active = Arc::clone(&active);
            let running = Arc::clone(&running);
            std::thread::spawn(move || dispatcher_loop(&endpoint, &active, &running))
        };

        Ok(Server {
            endpoint,
            running,
            dispatcher: Some(dispatcher),
            active,
            config,
        })
    }

    /// Returns the endpoint's local address.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Endpoint`] if the OS cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransferError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Runs one complete file transfer to `client_uri` (`IPv4:port`),
    /// blocking until the transaction reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] for configuration-class failures: a
    /// malformed `client_uri`, a missing file, or a transaction already
    /// active for that peer's IP. Protocol-level and local I/O failures
    /// during the transfer do not error; they resolve to `Status::Cxl`.
    pub fn start_transfer(
        &self,
        client_uri: &str,
        file_path: &Path,
        version: u32,
        device: Device,
    ) -> Result<Status, TransferError> {
        let addr = SocketAddrV4::from_str(client_uri).map_err(|source| TransferError::InvalidClientUri {
            uri: client_uri.to_string(),
            source,
        })?;

        if !file_path.exists() {
            return Err(TransferError::FileNotFound(file_path.to_path_buf()));
        }

        let client_ip = *addr.ip();
        let transaction = {
            let mut active = self.active.lock().unwrap_or_else(|poison| poison.into_inner());
            if active.contains_key(&client_ip) {
                return Err(TransferError::DuplicateTransaction(client_ip));
            }

            let transaction = ServerTransaction::new(
                self.endpoint.clone() as Arc<dyn SendDatagram>,
                SocketAddr::V4(addr),
                file_path.to_path_buf(),
                version,
                device.id,
            )
            .map_err(|source| TransferError::FileMetadata {
                path: file_path.to_path_buf(),
                source,
            })?;

            active.insert(client_ip, Arc::clone(&transaction));
            transaction
        };

        let result = self.run_negotiation(&transaction);
        self.active
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(&client_ip);
        transaction.join_sender();
        Ok(result)
    }

    fn run_negotiation(&self, transaction: &Arc<ServerTransaction>) -> Status {
        transaction.send_message(Kind::Ntf);
        let Some(status) = transaction.wait_for_status(self.config.negotiation_wait) else {
            tracing::info!("no CHK response; peer not present");
            return Status::Ntf;
        };
        if status != Status::Chk {
            return self.abort_and_report(transaction, status);
        }

        transaction.send_message(Kind::Info);
        let Some(status) = transaction.wait_for_status(self.config.negotiation_wait) else {
            return self.abort_and_report(transaction, Status::Cxl);
        };
        if status != Status::Rdy {
            return self.abort_and_report(transaction, status);
        }

        transaction.send_message(Kind::Data);
        let Some(status) = transaction.wait_for_status(self.config.done_wait) else {
            return self.abort_and_report(transaction, Status::Cxl);
        };
        if status != Status::Done {
            return self.abort_and_report(transaction, status);
        }

        transaction.send_message(Kind::Fin);
        Status::Fin
    }

    fn abort_and_report(&self, transaction: &Arc<ServerTransaction>, observed: Status) -> Status {
        if observed != Status::Cxl {
            transaction.send_message(Kind::Cxl);
        }
        Status::Cxl
    }

    /// Sends `CXL` to the active transaction for `client_ip`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnknownPeer`] if no transaction is active
    /// for that address, or [`TransferError::InvalidClientUri`] if
    /// `client_ip` does not parse as an IPv4 address.
    pub fn abort(&self, client_ip: &str) -> Result<(), TransferError> {
        let ip = Ipv4Addr::from_str(client_ip).map_err(|source| TransferError::InvalidClientUri {
            uri: client_ip.to_string(),
            source,
        })?;

        let active = self.active.lock().unwrap_or_else(|poison| poison.into_inner());
        let transaction = active.get(&ip).ok_or(TransferError::UnknownPeer(ip))?;
        transaction.send_message(Kind::Cxl);
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

fn dispatcher_loop(endpoint: &UdpEndpoint, active: &ActiveTransactions, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        let Some((frame, addr)) = receive_frame(endpoint) else {
            continue;
        };

        let SocketAddr::V4(v4_addr) = addr else {
            tracing::warn!(peer = %addr, "dropping non-IPv4 datagram");
            continue;
        };

        let transaction = active
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(v4_addr.ip())
            .cloned();

        match transaction {
            Some(transaction) => transaction.on_receive(&frame, addr),
            None => tracing::warn!(peer = %addr, "no active transaction for peer"),
        }
    }
}
