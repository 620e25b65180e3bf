//! The TRFTP client: owns one UDP endpoint and at most one active inbound
//! transaction (spec.md §2, §4.4, §6).

mod transaction;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use endpoint::UdpEndpoint;

use crate::config::ClientConfig;
use crate::dispatch::{receive_frame, SendDatagram};
use crate::error::TransferError;
use transaction::ClientTransaction;

/// A long-lived TRFTP client process.
///
/// Binds one UDP endpoint on construction and runs a background dispatcher
/// thread for the rest of its lifetime; dropping the client stops that
/// thread.
pub struct Client {
    endpoint: Arc<UdpEndpoint>,
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
    transaction: Arc<ClientTransaction>,
}

impl Client {
    /// Binds a client on `port` (or an ephemeral port if `port == 0`) that
    /// currently holds `current_version`, with the default [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Endpoint`] if the socket cannot be bound.
    pub fn new(port: u16, current_version: u32) -> Result<Client, TransferError> {
        Self::with_config(port, current_version, ClientConfig::default())
    }

    /// Like [`Client::new`], with an explicit [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Endpoint`] if the socket cannot be bound.
    pub fn with_config(port: u16, current_version: u32, config: ClientConfig) -> Result<Client, TransferError> {
        let endpoint = Arc::new(UdpEndpoint::bind(port)?);
        let transaction = Arc::new(ClientTransaction::new(
            Arc::clone(&endpoint) as Arc<dyn SendDatagram>,
            current_version,
            config.initial_ipg_us,
            config.idle_timeout,
            config.staging_dir,
        ));
        let running = Arc::new(AtomicBool::new(true));

        let dispatcher = {
            let endpoint = Arc::clone(&endpoint);
            let transaction = Arc::clone(&transaction);
            let running = Arc::clone(&running);
            std::thread::spawn(move || dispatcher_loop(&endpoint, &transaction, &running))
        };

        Ok(Client {
            endpoint,
            running,
            dispatcher: Some(dispatcher),
            transaction,
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

    /// Registers a callback invoked once a file has been staged, verified,
    /// and confirmed (spec.md §4.4 "FIN" transition), replacing any
    /// previously attached handler.
    pub fn attach_handler<F>(&self, handler: F)
    where
        F: Fn(&Path, u32) + Send + Sync + 'static,
    {
        self.transaction.attach_handler(handler);
    }

    /// Removes the currently attached handler, if any.
    pub fn detach_handler(&self) {
        self.transaction.detach_handler();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

fn dispatcher_loop(endpoint: &UdpEndpoint, transaction: &Arc<ClientTransaction>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match receive_frame(endpoint) {
            Some((frame, addr)) => transaction.dispatch(&frame, addr),
            None => transaction.check_idle(),
        }
    }
}
